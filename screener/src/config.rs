use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::helper_functions::project_root;

/// Parameters handed to `blastn` for every batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastProfile {
    pub task: String,
    pub word_size: u32,
    pub evalue: f64,
    pub gap_open: u32,
    pub gap_extend: u32,
    pub perc_identity: f64,
    pub qcov_hsp_perc: f64,
    /// Low-complexity (DUST) filtering.
    pub dust: bool,
    pub max_target_seqs: u32,
    pub max_hsps: u32,
    pub threads_per_invocation: u32,
}

impl Default for BlastProfile {
    fn default() -> Self {
        BlastProfile {
            task: "blastn-short".to_string(),
            word_size: 7,
            evalue: 1000.0,
            gap_open: 2,
            gap_extend: 1,
            perc_identity: 70.0,
            qcov_hsp_perc: 70.0,
            dust: true,
            max_target_seqs: 10,
            max_hsps: 1,
            threads_per_invocation: 1,
        }
    }
}

/// Thresholds that turn a raw hit into an off-target call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Percent of the query covered by the alignment; strictly greater triggers.
    pub min_coverage: f64,
    /// Percent identity; strictly greater triggers.
    pub min_identity: f64,
    /// Gene names whose hits are the intended target and never penalised.
    pub on_target_names: Vec<String>,
    /// Flag a hit whose identical bases reach `min(limit, len - 2)`. Off when `None`.
    pub max_matching_bases: Option<usize>,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        ClassifierThresholds {
            min_coverage: 70.0,
            min_identity: 70.0,
            on_target_names: vec!["ATXN1".to_string()],
            max_matching_bases: None,
        }
    }
}

/// What a sequence is assumed to be when its batch produced no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat as specific.
    #[default]
    Optimistic,
    /// Treat as off-target.
    Pessimistic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Database prefix as given to `blastn -db`.
    pub database: PathBuf,
    /// Explicit engine path; resolved from `PATH` when unset.
    pub blastn_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Where per-batch query files and logs live. Defaults to `<output_dir>/batches`.
    pub work_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub workers: usize,
    pub timeout_secs: u64,
    pub keep_intermediates: bool,
    pub failure_policy: FailurePolicy,
    pub blast: BlastProfile,
    pub thresholds: ClassifierThresholds,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig {
            database: PathBuf::from("blast_dbs/human_refseq_complete"),
            blastn_path: None,
            output_dir: PathBuf::from("./blast_results"),
            work_dir: None,
            batch_size: 500,
            workers: 4,
            timeout_secs: 300,
            keep_intermediates: false,
            failure_policy: FailurePolicy::Optimistic,
            blast: BlastProfile::default(),
            thresholds: ClassifierThresholds::default(),
        }
    }
}

impl ScreenConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        info!("Reading configuration from {}", path.display());
        let file = File::open(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        let config: ScreenConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid config file {}", path.display()))?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be a positive integer");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        if self.blast.threads_per_invocation == 0 {
            bail!("blast.threads_per_invocation must be at least 1");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn work_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => resolve(dir),
            None => self.output_dir().join("batches"),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        resolve(&self.output_dir)
    }

    pub fn database(&self) -> PathBuf {
        resolve(&self.database)
    }
}

/// Relative paths are anchored at the project root.
fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root().join(path)
    }
}

/// The run cannot start unless the nucleotide database index is present.
pub fn check_database(database: &Path) -> Result<()> {
    let candidates = ["nhr", "nal", "00.nhr"];
    for ext in candidates {
        let index = PathBuf::from(format!("{}.{}", database.display(), ext));
        if index.exists() {
            debug!("Found BLAST database index {}", index.display());
            return Ok(());
        }
    }
    bail!(
        "BLAST database not found at {} (expected {}.nhr or {}.nal)",
        database.display(),
        database.display(),
        database.display()
    )
}
