use crate::config::{ProcessConfig, Replacements};
use crate::record::FileRecord;
use crate::sanitize::{apply_replacements, normalize_text, trim_trailing_symbol};
use crate::stage::{
    finish_report, for_each_record, rejection_snapshot, ProcessContext, Stage, StageKind,
    StageReport,
};
use tracing::{debug, info};

/// Rewrites record names through the configured replacement list.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameStage;

impl RenameStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for RenameStage {
    fn kind(&self) -> StageKind {
        StageKind::Rename
    }

    fn process(&self, config: &mut ProcessConfig, _ctx: &ProcessContext) -> StageReport {
        if config.replacements.table.is_empty() {
            info!("no replacements configured, rename skipped");
            return StageReport::skipped(StageKind::Rename, config.files.len());
        }

        let parallel = config.use_parallel(config.files.len());
        let before = rejection_snapshot(&config.files);
        let replacements = &config.replacements;
        info!(records = config.files.len(), parallel, "renaming records");

        let result = for_each_record(&mut config.files, parallel, |record| {
            rename_record(record, replacements);
            Ok(())
        });

        finish_report(StageKind::Rename, &config.files, &before, 0, result)
    }
}

/// New name for `name`, or `None` when it only differs by letter case.
pub fn cleaned_name(name: &str, replacements: &Replacements) -> Option<String> {
    let trimmed = trim_trailing_symbol(name).to_string();
    let mut value = apply_replacements(trimmed, &replacements.table);
    if replacements.normalize {
        value = normalize_text(&value);
    }

    if value.to_lowercase() == name.to_lowercase() {
        None
    } else {
        Some(value)
    }
}

fn rename_record(record: &mut FileRecord, replacements: &Replacements) {
    if let Some(name) = cleaned_name(record.name(), replacements) {
        debug!(from = record.name(), to = %name, "renamed");
        record.set_name(name);
    }
}
