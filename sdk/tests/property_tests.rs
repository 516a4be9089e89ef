use proptest::prelude::*;
use sdk::errors::{EngineError, ErrorExt};
use sdk::judge::{JudgeVerdict, Recommendation};
use sdk::knowledge::NewKnowledge;

// User hints are static and never echo the raw error payload
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC+") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Database(error_str.clone()),
            EngineError::Actuator(error_str.clone()),
            EngineError::Bridge(error_str.clone()),
            EngineError::Judge(error_str.clone()),
            EngineError::JudgeUnparseable(error_str.clone()),
            EngineError::Approval(error_str.clone()),
            EngineError::FeatureNotFound(error_str.clone()),
            EngineError::KillSwitchActive(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!err.to_string().is_empty());
        }
    }
}

// Knowledge confidence is always clamped into [0, 1]
proptest! {
    #[test]
    fn test_knowledge_confidence_clamped(confidence in -10.0f64..10.0) {
        let entry = NewKnowledge::new("ui_layout", "topic", "content", "exploration")
            .with_confidence(confidence);
        prop_assert!((0.0..=1.0).contains(&entry.confidence));
    }
}

// Verdicts survive the bridge wire format unchanged
proptest! {
    #[test]
    fn test_verdict_wire_format(
        visual in 0.0f64..10.0,
        motion in 0.0f64..10.0,
        issues in prop::collection::vec("[a-z ]{1,20}", 0..4),
        rec in prop_oneof![
            Just(Recommendation::Approve),
            Just(Recommendation::Regenerate),
            Just(Recommendation::Adjust),
        ],
    ) {
        let verdict = JudgeVerdict {
            visual_quality: visual,
            motion,
            consistency: 5.0,
            audio_sync: 5.0,
            script_adherence: 5.0,
            issues,
            recommendation: rec,
            regeneration_notes: String::new(),
            checklist: Vec::new(),
        };
        let json = serde_json::to_string(&verdict).unwrap();
        let parsed: JudgeVerdict = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed.recommendation, verdict.recommendation);
        prop_assert_eq!(parsed.issues, verdict.issues);
        prop_assert!((parsed.visual_quality - visual).abs() < 1e-9);
    }
}
