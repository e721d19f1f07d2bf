use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, error, info, warn};

use crate::alignment_tools::SimilarityOracle;
use crate::config::{BlastProfile, ScreenConfig};
use crate::models::{BatchResult, BatchStatus, HitRecord};
use crate::screening::batching::Batch;

const OUTFMT: &str =
    "6 qseqid sseqid pident length mismatch gapopen qstart qend sstart send evalue bitscore stitle";
const MIN_FIELDS: usize = 12;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs local `blastn` once per batch.
#[derive(Debug, Clone)]
pub struct BlastnClient {
    executable: PathBuf,
    database: PathBuf,
    profile: BlastProfile,
    timeout: Duration,
    work_dir: PathBuf,
    keep_intermediates: bool,
}

enum Invocation {
    Finished(String),
    TimedOut,
}

impl BlastnClient {
    /// Builds a client from the run configuration, locating `blastn` on `PATH`
    /// when no explicit executable is configured.
    pub fn from_config(config: &ScreenConfig) -> Result<Self> {
        let executable = match &config.blastn_path {
            Some(path) => path.clone(),
            None => which::which("blastn").context("blastn not found on PATH")?,
        };
        Self::new(executable, config)
    }

    pub fn new(executable: PathBuf, config: &ScreenConfig) -> Result<Self> {
        let work_dir = config.work_dir();
        fs::create_dir_all(&work_dir)
            .with_context(|| format!("cannot create work dir {}", work_dir.display()))?;
        debug!("Using engine {} with work dir {}", executable.display(), work_dir.display());
        Ok(BlastnClient {
            executable,
            database: config.database(),
            profile: config.blast.clone(),
            timeout: config.timeout(),
            work_dir,
            keep_intermediates: config.keep_intermediates,
        })
    }

    pub fn command_args(&self, query: &Path) -> Vec<String> {
        let p = &self.profile;
        vec![
            "-task".to_string(),
            p.task.clone(),
            "-query".to_string(),
            query.display().to_string(),
            "-db".to_string(),
            self.database.display().to_string(),
            "-word_size".to_string(),
            p.word_size.to_string(),
            "-evalue".to_string(),
            p.evalue.to_string(),
            "-gapopen".to_string(),
            p.gap_open.to_string(),
            "-gapextend".to_string(),
            p.gap_extend.to_string(),
            "-perc_identity".to_string(),
            p.perc_identity.to_string(),
            "-qcov_hsp_perc".to_string(),
            p.qcov_hsp_perc.to_string(),
            "-dust".to_string(),
            if p.dust { "yes" } else { "no" }.to_string(),
            "-max_target_seqs".to_string(),
            p.max_target_seqs.to_string(),
            "-max_hsps".to_string(),
            p.max_hsps.to_string(),
            "-num_threads".to_string(),
            p.threads_per_invocation.to_string(),
            "-outfmt".to_string(),
            OUTFMT.to_string(),
        ]
    }

    fn scratch_file(&self, batch: &Batch, suffix: &str) -> Result<NamedTempFile> {
        Builder::new()
            .prefix(&format!("batch_{:05}_", batch.number))
            .suffix(suffix)
            .tempfile_in(&self.work_dir)
            .with_context(|| format!("cannot create scratch file in {}", self.work_dir.display()))
    }

    fn invoke(&self, batch: &Batch) -> Result<Invocation> {
        let query = self.scratch_file(batch, ".fa")?;
        fs::write(query.path(), batch.to_fasta())
            .with_context(|| format!("cannot write query file {}", query.path().display()))?;
        let output = self.scratch_file(batch, ".tsv")?;
        let stderr = self.scratch_file(batch, ".stderr")?;

        debug!(
            "Executing: {} {}",
            self.executable.display(),
            self.command_args(query.path()).join(" ")
        );

        let mut child = Command::new(&self.executable)
            .args(self.command_args(query.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::from(output.reopen()?))
            .stderr(Stdio::from(stderr.reopen()?))
            .spawn()
            .with_context(|| format!("failed to start {}", self.executable.display()))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e).context("failed to poll blastn");
                }
            }
            let now = Instant::now();
            if now >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(Invocation::TimedOut);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        };

        if !status.success() {
            let message = fs::read_to_string(stderr.path()).unwrap_or_default();
            bail!("blastn exited with {}: {}", status, message.trim());
        }

        let raw = fs::read_to_string(output.path())
            .with_context(|| format!("cannot read blastn output {}", output.path().display()))?;

        if self.keep_intermediates {
            query.keep()?;
            output.keep()?;
        }
        Ok(Invocation::Finished(raw))
    }

    fn write_batch_log(&self, result: &BatchResult) {
        let path = self.work_dir.join(format!("batch_{:05}.log", result.number));
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&path)?;
            writeln!(file, "batch\t{}", result.number)?;
            writeln!(file, "offset\t{}", result.offset)?;
            writeln!(file, "batch_size\t{}", result.size)?;
            writeln!(file, "status\t{}", result.status)?;
            writeln!(file, "queries_with_hits\t{}", result.hits.len())?;
            writeln!(file, "hits_found\t{}", result.hit_count())?;
            writeln!(file, "elapsed_secs\t{:.2}", result.elapsed_secs)?;
            if let Some(message) = &result.message {
                writeln!(file, "message\t{}", message.replace('\n', " "))?;
            }
            Ok(())
        };
        if let Err(e) = write() {
            warn!("Could not write batch log {}: {}", path.display(), e);
        }
    }
}

impl SimilarityOracle for BlastnClient {
    fn name(&self) -> &str {
        "blastn"
    }

    fn run(&self, batch: &Batch) -> BatchResult {
        if batch.is_empty() {
            debug!(batch = batch.number, "Empty batch, engine not invoked");
            return BatchResult {
                number: batch.number,
                offset: batch.offset,
                size: 0,
                status: BatchStatus::Success,
                hits: HashMap::new(),
                elapsed_secs: 0.0,
                message: None,
            };
        }
        let started = Instant::now();
        let mut result = match self.invoke(batch) {
            Ok(Invocation::Finished(raw)) => {
                let hits = group_hit_lines(&raw);
                BatchResult {
                    number: batch.number,
                    offset: batch.offset,
                    size: batch.len(),
                    status: BatchStatus::Success,
                    hits,
                    elapsed_secs: 0.0,
                    message: None,
                }
            }
            Ok(Invocation::TimedOut) => {
                warn!("Batch {} timed out after {:?}", batch.number, self.timeout);
                BatchResult::failed(
                    batch.number,
                    batch.offset,
                    batch.len(),
                    BatchStatus::Timeout,
                    format!("timed out after {}s", self.timeout.as_secs_f64()),
                )
            }
            Err(e) => {
                error!("Batch {} failed: {:#}", batch.number, e);
                BatchResult::failed(
                    batch.number,
                    batch.offset,
                    batch.len(),
                    BatchStatus::Error,
                    format!("{:#}", e),
                )
            }
        };
        result.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            batch = batch.number,
            size = batch.len(),
            hits = result.hit_count(),
            status = %result.status,
            "Batch finished in {:.1}s",
            result.elapsed_secs
        );
        self.write_batch_log(&result);
        result
    }
}

/// Groups raw tabular output by query id, keeping emission order.
/// Blank and malformed lines are skipped.
pub fn group_hit_lines(raw: &str) -> HashMap<String, Vec<String>> {
    let mut hits: HashMap<String, Vec<String>> = HashMap::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < MIN_FIELDS || fields[0].is_empty() {
            debug!("Skipping malformed line: {}", line);
            continue;
        }
        hits.entry(fields[0].to_string()).or_default().push(line.to_string());
    }
    hits
}

/// Parses one `-outfmt 6` line in the column order of [`OUTFMT`].
pub fn parse_hit_line(line: &str) -> Option<HitRecord> {
    let fields: Vec<&str> = line.splitn(13, '\t').collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }
    Some(HitRecord {
        query_id: fields[0].to_string(),
        subject_id: fields[1].to_string(),
        percent_identity: fields[2].trim().parse().ok()?,
        alignment_length: fields[3].trim().parse().ok()?,
        mismatches: fields[4].trim().parse().ok()?,
        gap_opens: fields[5].trim().parse().ok()?,
        query_start: fields[6].trim().parse().ok()?,
        query_end: fields[7].trim().parse().ok()?,
        subject_start: fields[8].trim().parse().ok()?,
        subject_end: fields[9].trim().parse().ok()?,
        evalue: fields[10].trim().parse().ok()?,
        bit_score: fields[11].trim().parse().ok()?,
        subject_title: fields.get(12).map(|t| t.trim().to_string()).unwrap_or_default(),
    })
}
