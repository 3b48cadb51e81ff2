use crate::config::ProcessConfig;
use crate::error::{Containment, ErrorSink, PipelineError};
use crate::record::FileRecord;
use crate::stage::{ProcessContext, Stage, StageKind, StageOutcome, StageReport};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Walks every source path and appends the matching files to `config.files`.
#[derive(Clone, Default)]
pub struct DiscoveryStage {
    sink: Option<ErrorSink>,
}

impl DiscoveryStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(mut self, sink: ErrorSink) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl Stage for DiscoveryStage {
    fn kind(&self) -> StageKind {
        StageKind::Discovery
    }

    fn set_error_sink(&mut self, sink: ErrorSink) {
        self.sink = Some(sink);
    }

    fn process(&self, config: &mut ProcessConfig, _ctx: &ProcessContext) -> StageReport {
        let sources: Vec<(std::path::PathBuf, bool)> = config
            .sources()
            .map(|(path, recursive)| (path.to_path_buf(), recursive))
            .collect();
        if sources.is_empty() {
            return StageReport::aborted(
                StageKind::Discovery,
                PipelineError::Config("no source paths configured".to_string()),
            );
        }

        let containment = Containment::new(self.sink.as_ref(), config.continue_on_error);
        let mut found = Vec::new();
        let mut outcome = StageOutcome::Completed;

        for (path, recursive) in &sources {
            info!(source = %path.display(), recursive, "scanning source");
            if let Err(err) = collect_files(path, *recursive, config, &containment, &mut found) {
                outcome = StageOutcome::Aborted(err);
                break;
            }
        }

        info!(found = found.len(), "discovery finished");
        let records = found.len();
        config.files.append(&mut found);

        StageReport {
            stage: StageKind::Discovery,
            outcome,
            records,
            contained: containment.reported(),
            rejected: Vec::new(),
        }
    }
}

fn collect_files(
    root: &Path,
    recursive: bool,
    config: &ProcessConfig,
    containment: &Containment<'_>,
    out: &mut Vec<FileRecord>,
) -> Result<(), PipelineError> {
    if !root.is_dir() {
        return containment.handle(PipelineError::SourceNotFound {
            path: root.to_path_buf(),
        });
    }

    let root = match fs::canonicalize(root) {
        Ok(root) => root,
        Err(err) => {
            return containment.handle(PipelineError::Enumerate {
                path: root.to_path_buf(),
                reason: err.to_string(),
            })
        }
    };

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root.as_path()).to_path_buf();
                containment.handle(PipelineError::Enumerate {
                    path,
                    reason: err.to_string(),
                })?;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let extension = path
            .extension()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        if !config.extensions.accepts(&extension) {
            debug!(path = %path.display(), "extension filtered out");
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => out.push(FileRecord::from_entry(path, &metadata)),
            Err(err) => containment.handle(PipelineError::Enumerate {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?,
        }
    }

    Ok(())
}
