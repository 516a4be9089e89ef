//! CLI interface for Framewright
//!
//! Commands and global flags, defined with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Framewright
///
/// Learns a web-based video production tool by exploring and practising its
/// features, then produces quality-gated videos from scripts.
#[derive(Parser, Debug)]
#[command(name = "framewright")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Explore features without spending credits
    Explore {
        /// Session length (default: exploration.default_minutes)
        #[arg(short, long)]
        minutes: Option<u64>,
    },

    /// Practise generative features within a credit budget
    HandsOn {
        /// Session length (default: hands_on.default_minutes)
        #[arg(short, long)]
        minutes: Option<u64>,

        /// Credit budget (default: hands_on.default_budget)
        #[arg(short, long)]
        budget: Option<i64>,
    },

    /// Explore or practise, whichever is needed next
    Auto {
        #[arg(short, long)]
        minutes: Option<u64>,

        #[arg(short, long)]
        budget: Option<i64>,
    },

    /// Show learning progress, the job queue and the kill switch
    Status,

    /// Show learning progress per category
    Progress,

    /// Show the learned credit and time cost of each feature
    Costs,

    /// Seed the feature table from the curriculum
    Seed {
        /// Curriculum file (default: curriculum.path, else built-in)
        #[arg(long, value_name = "PATH")]
        curriculum: Option<PathBuf>,
    },

    /// Manage features
    Features {
        #[command(subcommand)]
        action: FeatureAction,
    },

    /// Manage production jobs
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Show job counts per status and credits used
    Queue {
        /// Only list jobs with this status
        #[arg(long)]
        status: Option<String>,
    },
}

/// Feature management actions
#[derive(Subcommand, Debug)]
pub enum FeatureAction {
    /// Reset a feature's confidence to zero
    Reset {
        /// Category the feature belongs to
        category: String,
        /// Feature name
        name: String,
    },
}

/// Production job actions
#[derive(Subcommand, Debug)]
pub enum JobAction {
    /// Submit, plan and queue a job for approval
    Submit {
        #[arg(short, long)]
        title: String,

        /// Script text
        #[arg(short, long, conflicts_with = "script_file")]
        script: Option<String>,

        /// Read the script from a file
        #[arg(long, value_name = "PATH")]
        script_file: Option<PathBuf>,

        /// Description used when there is no script
        #[arg(short, long)]
        description: Option<String>,

        /// Model name, or "auto"
        #[arg(short, long, default_value = "auto")]
        model: String,

        /// Output length in seconds
        #[arg(long, default_value = "30")]
        duration: u32,
    },

    /// Approve a planned job
    Approve { job_id: i64 },

    /// Reject a planned job
    Reject { job_id: i64 },

    /// Render an approved job
    Produce { job_id: i64 },

    /// Show a job with its attempt log
    Show { job_id: i64 },

    /// List approval requests waiting for a decision
    Pending,
}
