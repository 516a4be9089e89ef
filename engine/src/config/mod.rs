//! Configuration management
//!
//! This module handles loading, validation, and management of the Framewright
//! configuration. Configuration is stored in TOML format at
//! ~/.framewright/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, kill switch file
//! - **actuator**: Automation bridge process and reconnection limits
//! - **exploration**: Exploration session defaults
//! - **hands_on**: Credit budget and breaker settings for hands-on sessions
//! - **production**: Models, credit rates, quality gate and portfolio
//! - **curriculum**: Where the feature curriculum lives
//!
//! # Path Expansion
//!
//! `~` in any configured path is expanded to the user's home directory when
//! the configuration is loaded. The data directory is created if missing.
//!
//! # Examples
//!
//! ```no_run
//! use framewright_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Default model: {}", config.production.default_model);
//! # Ok(())
//! # }
//! ```

use crate::telemetry::LogFormat;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Automation bridge settings
    #[serde(default)]
    pub actuator: ActuatorConfig,

    /// Exploration session settings
    #[serde(default)]
    pub exploration: ExplorationConfig,

    /// Hands-on session settings
    #[serde(default)]
    pub hands_on: HandsOnConfig,

    /// Production pipeline settings
    #[serde(default)]
    pub production: ProductionConfig,

    /// Curriculum location
    #[serde(default)]
    pub curriculum: CurriculumConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (auto, pretty, json)
    #[serde(default)]
    pub log_format: LogFormat,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// While this file exists no session or production run may start
    #[serde(default = "default_kill_switch_file")]
    pub kill_switch_file: PathBuf,
}

/// Automation bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Program that speaks the JSON-lines bridge protocol on stdio
    #[serde(default = "default_bridge_command")]
    pub bridge_command: String,

    #[serde(default)]
    pub bridge_args: Vec<String>,

    /// Step limit handed to every actuator task
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Pause before each restart attempt (seconds)
    #[serde(default = "default_restart_pause")]
    pub restart_pause_secs: u64,

    /// Restarts allowed per controller session
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Extra reads when the balance comes back as zero
    #[serde(default = "default_credit_read_retries")]
    pub credit_read_retries: u32,

    /// Longest wait for a single bridge response (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            bridge_command: default_bridge_command(),
            bridge_args: Vec::new(),
            max_steps: default_max_steps(),
            restart_pause_secs: default_restart_pause(),
            max_restarts: default_max_restarts(),
            credit_read_retries: default_credit_read_retries(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Exploration session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationConfig {
    #[serde(default = "default_explore_minutes")]
    pub default_minutes: u64,

    /// Pause between features (seconds)
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,

    /// Features that matter for upcoming production jobs
    #[serde(default)]
    pub job_relevant: Vec<String>,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Knowledge source marking reference (tutorial) material
    #[serde(default = "default_reference_source")]
    pub reference_source: String,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_explore_minutes(),
            pause_secs: default_pause_secs(),
            job_relevant: Vec::new(),
            max_consecutive_failures: default_max_consecutive_failures(),
            reference_source: default_reference_source(),
        }
    }
}

/// Hands-on session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandsOnConfig {
    #[serde(default = "default_hands_on_minutes")]
    pub default_minutes: u64,

    #[serde(default = "default_budget")]
    pub default_budget: i64,

    /// A drop larger than this that ends on a zero balance is treated as a
    /// misread rather than real spend
    #[serde(default = "default_plausibility_ceiling")]
    pub credit_plausibility_ceiling: i64,

    /// Stop the session when the balance falls below this
    #[serde(default = "default_safety_floor")]
    pub safety_floor: i64,

    /// Upper bound on what a single generation may spend
    #[serde(default = "default_per_action_cap")]
    pub per_action_cap: i64,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Categories whose features all spend credits
    #[serde(default = "default_generative_categories")]
    pub generative_categories: Vec<String>,

    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
}

impl Default for HandsOnConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_hands_on_minutes(),
            default_budget: default_budget(),
            credit_plausibility_ceiling: default_plausibility_ceiling(),
            safety_floor: default_safety_floor(),
            per_action_cap: default_per_action_cap(),
            max_consecutive_failures: default_max_consecutive_failures(),
            generative_categories: default_generative_categories(),
            pause_secs: default_pause_secs(),
        }
    }
}

/// Production pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionConfig {
    /// Model used when a job asks for "auto"
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Credits per second of output, by model
    #[serde(default = "default_credit_rates")]
    pub credit_rates: BTreeMap<String, i64>,

    /// Rate for models missing from `credit_rates`
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: i64,

    #[serde(default = "default_portfolio_dir")]
    pub portfolio_dir: PathBuf,

    /// Screen checks while waiting for a render
    #[serde(default = "default_render_poll_limit")]
    pub render_poll_limit: u32,

    #[serde(default = "default_render_poll_interval")]
    pub render_poll_interval_secs: u64,

    /// Missing or wrong critical checklist items fail the review
    #[serde(default = "default_true")]
    pub enforce_critical_categories: bool,

    #[serde(default = "default_critical_categories")]
    pub critical_categories: Vec<String>,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            credit_rates: default_credit_rates(),
            fallback_rate: default_fallback_rate(),
            portfolio_dir: default_portfolio_dir(),
            render_poll_limit: default_render_poll_limit(),
            render_poll_interval_secs: default_render_poll_interval(),
            enforce_critical_categories: true,
            critical_categories: default_critical_categories(),
        }
    }
}

/// Curriculum configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumConfig {
    /// Curriculum TOML file; the built-in curriculum is used when missing
    #[serde(default = "default_curriculum_path")]
    pub path: PathBuf,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            path: default_curriculum_path(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.framewright")
}

fn default_kill_switch_file() -> PathBuf {
    PathBuf::from("~/.framewright/STOP")
}

fn default_bridge_command() -> String {
    "framewright-bridge".to_string()
}

fn default_max_steps() -> u32 {
    25
}

fn default_restart_pause() -> u64 {
    3
}

fn default_max_restarts() -> u32 {
    3
}

fn default_credit_read_retries() -> u32 {
    1
}

fn default_request_timeout() -> u64 {
    900
}

fn default_explore_minutes() -> u64 {
    30
}

fn default_hands_on_minutes() -> u64 {
    60
}

fn default_pause_secs() -> u64 {
    5
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_reference_source() -> String {
    "tutorial".to_string()
}

fn default_budget() -> i64 {
    100
}

fn default_plausibility_ceiling() -> i64 {
    200
}

fn default_safety_floor() -> i64 {
    50
}

fn default_per_action_cap() -> i64 {
    40
}

fn default_generative_categories() -> Vec<String> {
    vec![
        "video_generation".to_string(),
        "image_generation".to_string(),
        "audio".to_string(),
    ]
}

fn default_model() -> String {
    "seedance".to_string()
}

fn default_credit_rates() -> BTreeMap<String, i64> {
    [
        ("seedance", 4),
        ("veo", 5),
        ("kling", 4),
        ("minimax", 3),
        ("luma", 3),
        ("runway", 5),
        ("auto", 4),
    ]
    .into_iter()
    .map(|(model, rate)| (model.to_string(), rate))
    .collect()
}

fn default_fallback_rate() -> i64 {
    4
}

fn default_portfolio_dir() -> PathBuf {
    PathBuf::from("~/.framewright/portfolio")
}

fn default_render_poll_limit() -> u32 {
    60
}

fn default_render_poll_interval() -> u64 {
    10
}

fn default_critical_categories() -> Vec<String> {
    vec![
        "characters".to_string(),
        "action".to_string(),
        "objects".to_string(),
    ]
}

fn default_curriculum_path() -> PathBuf {
    PathBuf::from("~/.framewright/curriculum.toml")
}

impl Config {
    /// Load configuration from the default location (~/.framewright/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before expansion so the file keeps portable ~ paths
        let config = Self::default_config();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.framewright/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".framewright").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                log_format: LogFormat::Auto,
                data_dir: default_data_dir(),
                kill_switch_file: default_kill_switch_file(),
            },
            actuator: ActuatorConfig::default(),
            exploration: ExplorationConfig::default(),
            hands_on: HandsOnConfig::default(),
            production: ProductionConfig::default(),
            curriculum: CurriculumConfig::default(),
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("framewright.db")
    }

    /// Whether the kill switch file is present
    pub fn kill_switch_engaged(&self) -> bool {
        self.core.kill_switch_file.exists()
    }

    /// Credits per second for a model, falling back to `fallback_rate`
    pub fn credit_rate(&self, model: &str) -> i64 {
        self.production
            .credit_rates
            .get(&model.to_lowercase())
            .copied()
            .unwrap_or(self.production.fallback_rate)
    }

    /// Validate and process configuration
    ///
    /// Validates numeric ranges, expands ~ in every path and creates the
    /// data directory if it doesn't exist.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.actuator.max_steps == 0 {
            return Err(EngineError::Config(
                "actuator.max_steps must be at least 1".to_string(),
            ));
        }

        if self.actuator.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "actuator.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        let hands_on = &self.hands_on;
        if hands_on.default_budget < 0
            || hands_on.safety_floor < 0
            || hands_on.per_action_cap <= 0
            || hands_on.credit_plausibility_ceiling <= 0
        {
            return Err(EngineError::Config(
                "hands_on budget, floor, cap and ceiling must be positive".to_string(),
            ));
        }

        if self.exploration.max_consecutive_failures == 0
            || hands_on.max_consecutive_failures == 0
        {
            return Err(EngineError::Config(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        if self.production.default_model.trim().is_empty()
            || self.production.default_model == "auto"
        {
            return Err(EngineError::Config(
                "production.default_model must name a concrete model".to_string(),
            ));
        }

        if let Some((model, rate)) = self
            .production
            .credit_rates
            .iter()
            .find(|(_, rate)| **rate <= 0)
        {
            return Err(EngineError::Config(format!(
                "Credit rate for '{}' must be positive (got {})",
                model, rate
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.core.kill_switch_file = expand_path(&self.core.kill_switch_file)?;
        self.production.portfolio_dir = expand_path(&self.production.portfolio_dir)?;
        self.curriculum.path = expand_path(&self.curriculum.path)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
