//! Credit metering
//!
//! Spend is measured as the drop in the displayed balance around an action.
//! Balance reads are unreliable: a failed read that comes back as zero
//! would look like the whole balance was spent. A drop larger than the
//! plausibility ceiling that ends on zero is therefore marked suspect.

use regex::Regex;
use sdk::actuator::Actuator;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Credits attributed to one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDelta {
    /// Both balances were read
    pub measured: bool,

    /// Raw drop, never negative
    pub raw: i64,

    /// Drop after clamping suspect readings to the ceiling
    pub counted: i64,

    pub suspect: bool,

    /// Balance after the action, if read
    pub after: Option<i64>,
}

impl CreditDelta {
    /// Credits that count toward budgets and cost history
    pub fn trusted(&self) -> Option<i64> {
        (self.measured && !self.suspect).then_some(self.counted)
    }

    /// Balance after the action, unless the reading is suspect
    pub fn trusted_after(&self) -> Option<i64> {
        if self.suspect {
            None
        } else {
            self.after
        }
    }
}

/// Reads balances and turns them into deltas
#[derive(Debug, Clone)]
pub struct CreditMeter {
    plausibility_ceiling: i64,
    zero_read_retries: u32,
}

impl CreditMeter {
    pub fn new(plausibility_ceiling: i64, zero_read_retries: u32) -> Self {
        Self {
            plausibility_ceiling,
            zero_read_retries,
        }
    }

    /// Read the balance, re-reading when it comes back as zero
    pub async fn read_balance(&self, actuator: &dyn Actuator) -> Option<i64> {
        let mut reading = actuator.credit_balance().await;
        let mut retries = 0;
        while reading == Some(0) && retries < self.zero_read_retries {
            retries += 1;
            debug!("Balance read as 0, re-reading ({}/{})", retries, self.zero_read_retries);
            reading = actuator.credit_balance().await;
        }
        reading
    }

    pub fn measure(&self, before: Option<i64>, after: Option<i64>) -> CreditDelta {
        let (Some(before), Some(after_value)) = (before, after) else {
            return CreditDelta {
                measured: false,
                raw: 0,
                counted: 0,
                suspect: false,
                after,
            };
        };

        let raw = (before - after_value).max(0);
        let suspect = raw > self.plausibility_ceiling && after_value == 0;
        if suspect {
            warn!(
                before,
                after = after_value,
                ceiling = self.plausibility_ceiling,
                "Suspect credit reading: clamping and excluding from budget"
            );
        }

        CreditDelta {
            measured: true,
            raw,
            counted: if suspect {
                self.plausibility_ceiling
            } else {
                raw
            },
            suspect,
            after: Some(after_value),
        }
    }
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d[\d,]*").ok())
        .as_ref()
}

/// Extract a balance from text such as "Credits: 1,250 remaining"
pub fn parse_credit_reading(text: &str) -> Option<i64> {
    number_pattern()?
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::fake::ScriptedActuator;

    #[test]
    fn test_normal_delta() {
        let meter = CreditMeter::new(200, 0);
        let delta = meter.measure(Some(500), Some(470));
        assert_eq!(delta.trusted(), Some(30));
        assert_eq!(delta.trusted_after(), Some(470));
    }

    #[test]
    fn test_suspect_zero_reading() {
        let meter = CreditMeter::new(200, 0);
        let delta = meter.measure(Some(1000), Some(0));
        assert!(delta.suspect);
        assert_eq!(delta.raw, 1000);
        assert_eq!(delta.counted, 200);
        assert_eq!(delta.trusted(), None);
        assert_eq!(delta.trusted_after(), None);
    }

    #[test]
    fn test_large_drop_to_nonzero_is_trusted() {
        let meter = CreditMeter::new(200, 0);
        let delta = meter.measure(Some(1000), Some(10));
        assert!(!delta.suspect);
        assert_eq!(delta.trusted(), Some(990));
    }

    #[test]
    fn test_balance_increase_is_zero_spend() {
        let meter = CreditMeter::new(200, 0);
        assert_eq!(meter.measure(Some(100), Some(300)).trusted(), Some(0));
    }

    #[test]
    fn test_unreadable_balance() {
        let meter = CreditMeter::new(200, 0);
        let delta = meter.measure(None, Some(50));
        assert!(!delta.measured);
        assert_eq!(delta.trusted(), None);
        assert_eq!(delta.trusted_after(), Some(50));
    }

    #[test]
    fn test_parse_credit_reading() {
        assert_eq!(parse_credit_reading("Credits: 1,250 remaining"), Some(1250));
        assert_eq!(parse_credit_reading("42"), Some(42));
        assert_eq!(parse_credit_reading("no balance shown"), None);
    }

    #[tokio::test]
    async fn test_zero_reading_is_retried() {
        let actuator = ScriptedActuator::new();
        actuator.push_balances([Some(0), Some(320)]);
        let meter = CreditMeter::new(200, 1);
        assert_eq!(meter.read_balance(&actuator).await, Some(320));
    }
}
