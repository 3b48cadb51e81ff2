use crate::record::FileRecord;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    /// Malformed or missing configuration; never contained.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source path not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to enumerate {}: {reason}", path.display())]
    Enumerate { path: PathBuf, reason: String },

    #[error("{}: {reason}", path.display())]
    Record { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub(crate) fn record(record: &FileRecord, reason: impl Into<String>) -> Self {
        Self::Record {
            path: record.full_path().to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Callback receiving contained failures.
pub type ErrorSink = Arc<dyn Fn(&PipelineError) + Send + Sync>;

/// Decides, for one stage run, whether a failure goes to the sink or aborts.
pub(crate) struct Containment<'a> {
    sink: Option<&'a ErrorSink>,
    active: bool,
    reported: AtomicUsize,
}

impl<'a> Containment<'a> {
    pub fn new(sink: Option<&'a ErrorSink>, continue_on_error: bool) -> Self {
        Self {
            active: sink.is_some() && continue_on_error,
            sink,
            reported: AtomicUsize::new(0),
        }
    }

    pub fn handle(&self, error: PipelineError) -> Result<(), PipelineError> {
        if error.is_fatal() || !self.active {
            return Err(error);
        }
        let Some(sink) = self.sink else {
            return Err(error);
        };
        warn!(%error, "contained failure");
        self.reported.fetch_add(1, Ordering::Relaxed);
        (**sink)(&error);
        Ok(())
    }

    /// Marks the record rejected before handing the failure on.
    pub fn reject(&self, record: &mut FileRecord, reason: String) -> Result<(), PipelineError> {
        let error = PipelineError::record(record, reason.clone());
        record.reject(reason);
        self.handle(error)
    }

    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}
