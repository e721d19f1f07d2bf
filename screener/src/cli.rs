use std::path::PathBuf;

use clap::Parser;

use crate::config::{FailurePolicy, ScreenConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Screen siRNA candidates for off-target similarity with local BLAST"
)]
pub struct Cli {
    /// sense strand table (CSV with fragment_id, sequence, size_nt)
    #[arg(long)]
    pub sense: PathBuf,

    /// antisense strand table, joined to the sense table on fragment_id
    #[arg(long)]
    pub antisense: PathBuf,

    /// JSON configuration file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// BLAST database prefix
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// path to the blastn executable
    #[arg(long)]
    pub blastn: Option<PathBuf>,

    /// output directory
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// directory for per-batch query files and logs
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// unique sequences per blastn invocation
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// concurrent blastn invocations
    #[arg(long)]
    pub workers: Option<usize>,

    /// per-batch timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// on-target gene name; hits naming it are not penalised (repeatable)
    #[arg(long = "on-target")]
    pub on_target: Vec<String>,

    /// treat sequences from failed batches as off-target
    #[arg(long, default_value_t = false)]
    pub pessimistic: bool,

    /// keep per-batch query and raw output files
    #[arg(long, default_value_t = false)]
    pub keep_intermediates: bool,

    /// enable debug logging
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Layers command-line overrides on top of `config`.
    pub fn apply(&self, mut config: ScreenConfig) -> ScreenConfig {
        if let Some(db) = &self.db {
            config.database = db.clone();
        }
        if let Some(blastn) = &self.blastn {
            config.blastn_path = Some(blastn.clone());
        }
        if let Some(dir) = &self.out_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = Some(dir.clone());
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if !self.on_target.is_empty() {
            config.thresholds.on_target_names = self.on_target.clone();
        }
        if self.pessimistic {
            config.failure_policy = FailurePolicy::Pessimistic;
        }
        if self.keep_intermediates {
            config.keep_intermediates = true;
        }
        config
    }
}
