use crate::classify::ClassifyStage;
use crate::config::ProcessConfig;
use crate::discovery::DiscoveryStage;
use crate::error::{ErrorSink, PipelineError};
use crate::relocate::RelocateStage;
use crate::rename::RenameStage;
use crate::stage::{ProcessContext, Stage, StageReport};
use serde::Serialize;
use tracing::{error, info};

/// Runs discovery, rename, classification and relocation in order.
pub struct Pipeline {
    ctx: ProcessContext,
    stages: Vec<Box<dyn Stage>>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn aborted(&self) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.is_aborted())
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.aborted().and_then(StageReport::error)
    }

    pub fn into_result(self) -> Result<Self, PipelineError> {
        match self.error() {
            Some(err) => Err(err.clone()),
            None => Ok(self),
        }
    }
}

impl Pipeline {
    pub fn new(ctx: ProcessContext) -> Self {
        Self {
            ctx,
            stages: vec![
                Box::new(DiscoveryStage::new()),
                Box::new(RenameStage::new()),
                Box::new(ClassifyStage::new()),
                Box::new(RelocateStage::new()),
            ],
        }
    }

    /// Registers one sink on every stage.
    pub fn on_error(mut self, sink: ErrorSink) -> Self {
        for stage in &mut self.stages {
            stage.set_error_sink(sink.clone());
        }
        self
    }

    pub fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    /// Stops after the first aborted stage; later stages never start.
    pub fn run(&self, config: &mut ProcessConfig) -> PipelineReport {
        let mut report = PipelineReport::default();

        for stage in &self.stages {
            info!(stage = %stage.kind(), "stage started");
            let stage_report = stage.process(config, &self.ctx);
            let aborted = stage_report.is_aborted();
            if let Some(err) = stage_report.error() {
                error!(stage = %stage.kind(), %err, "stage aborted");
            } else {
                info!(
                    stage = %stage.kind(),
                    outcome = ?stage_report.outcome,
                    records = stage_report.records,
                    rejected = stage_report.rejected.len(),
                    contained = stage_report.contained,
                    "stage finished"
                );
            }
            report.stages.push(stage_report);
            if aborted {
                break;
            }
        }

        report
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(ProcessContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathEntry, Replacement};
    use crate::stage::{StageKind, StageOutcome};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn runs_all_stages_in_order() {
        let temp = tempdir().expect("tempdir");
        let input = temp.path().join("in");
        fs::create_dir_all(&input).expect("create input");
        fs::write(input.join("meeting_notes_.txt"), b"notes").expect("write");

        let library = temp.path().join("library");
        let mut config = ProcessConfig {
            paths: vec![
                PathEntry::Source {
                    path: input.clone(),
                    recursive: false,
                },
                PathEntry::Destination {
                    path: library.clone(),
                    folders: true,
                },
                PathEntry::Rejected {
                    path: temp.path().join("rejected"),
                    append_date: false,
                    format: "%Y".to_string(),
                },
            ],
            ..ProcessConfig::default()
        };
        config.replacements.table = vec![Replacement::new("_", " ")];

        let report = Pipeline::default().run(&mut config);
        let kinds: Vec<StageKind> = report.stages.iter().map(|r| r.stage).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Discovery,
                StageKind::Rename,
                StageKind::Classify,
                StageKind::Relocate
            ]
        );
        assert!(report.error().is_none());
        assert!(library
            .join("meeting notes")
            .join("meeting notes.txt")
            .exists());
    }

    #[test]
    fn stops_after_aborted_stage() {
        let mut config = ProcessConfig::default();
        let report = Pipeline::default().run(&mut config);

        assert_eq!(report.stages.len(), 1);
        assert!(matches!(
            report.stages[0].outcome,
            StageOutcome::Aborted(PipelineError::Config(_))
        ));
        assert!(report.into_result().is_err());
    }
}
