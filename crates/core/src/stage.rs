use crate::config::ProcessConfig;
use crate::error::{ErrorSink, PipelineError};
use crate::exif_reader::{ExifTagReader, TagReader};
use crate::record::FileRecord;
use chrono::{DateTime, Local};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Dependencies handed to every stage.
#[derive(Clone)]
pub struct ProcessContext {
    pub tag_reader: Arc<dyn TagReader>,
    pub clock: Clock,
}

impl ProcessContext {
    pub fn new(tag_reader: Arc<dyn TagReader>, clock: Clock) -> Self {
        Self { tag_reader, clock }
    }

    pub fn now(&self) -> DateTime<Local> {
        (self.clock)()
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(Arc::new(ExifTagReader), Arc::new(Local::now))
    }
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Discovery,
    Rename,
    Classify,
    Relocate,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovery => "discovery",
            Self::Rename => "rename",
            Self::Classify => "classify",
            Self::Relocate => "relocate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", content = "error", rename_all = "lowercase")]
pub enum StageOutcome {
    Completed,
    Skipped,
    Aborted(PipelineError),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Rejection {
    pub key: String,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub outcome: StageOutcome,
    pub records: usize,
    pub contained: usize,
    pub rejected: Vec<Rejection>,
}

impl StageReport {
    pub fn skipped(stage: StageKind, records: usize) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            records,
            contained: 0,
            rejected: Vec::new(),
        }
    }

    pub fn aborted(stage: StageKind, error: PipelineError) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Aborted(error),
            records: 0,
            contained: 0,
            rejected: Vec::new(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, StageOutcome::Aborted(_))
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match &self.outcome {
            StageOutcome::Aborted(err) => Some(err),
            _ => None,
        }
    }
}

/// Common contract of the four pipeline stages.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Registers the callback that receives contained failures.
    ///
    /// Stages whose failures are all record outcomes ignore it.
    fn set_error_sink(&mut self, _sink: ErrorSink) {}

    fn process(&self, config: &mut ProcessConfig, ctx: &ProcessContext) -> StageReport;
}

/// Runs `action` over every record, on the rayon pool when `parallel` is set.
///
/// Each record is borrowed mutably by exactly one worker for the whole call, so
/// multi-field updates on a record never interleave. The first error stops the
/// iteration; records already handled keep their changes.
pub(crate) fn for_each_record<F>(
    files: &mut [FileRecord],
    parallel: bool,
    action: F,
) -> Result<(), PipelineError>
where
    F: Fn(&mut FileRecord) -> Result<(), PipelineError> + Send + Sync,
{
    if parallel {
        files.par_iter_mut().try_for_each(action)
    } else {
        files.iter_mut().try_for_each(action)
    }
}

/// Builds the report for a per-record stage, listing records that became
/// rejected while it ran.
pub(crate) fn finish_report(
    stage: StageKind,
    files: &[FileRecord],
    rejected_before: &[bool],
    contained: usize,
    result: Result<(), PipelineError>,
) -> StageReport {
    let rejected = files
        .iter()
        .zip(rejected_before)
        .filter(|(record, before)| record.is_rejected() && !**before)
        .map(|(record, _)| Rejection {
            key: record.key().to_string(),
            path: record.full_path().to_path_buf(),
            reason: record.comment().to_string(),
        })
        .collect();

    StageReport {
        stage,
        outcome: match result {
            Ok(()) => StageOutcome::Completed,
            Err(err) => StageOutcome::Aborted(err),
        },
        records: files.len(),
        contained,
        rejected,
    }
}

pub(crate) fn rejection_snapshot(files: &[FileRecord]) -> Vec<bool> {
    files.iter().map(FileRecord::is_rejected).collect()
}
