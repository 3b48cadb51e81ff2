use crate::config::ProcessConfig;
use crate::exif_reader::{find_date_tag, parse_exif_date, tag_text, TagReader};
use crate::record::FileRecord;
use crate::sanitize::trim_trailing_symbol;
use crate::stage::{
    finish_report, for_each_record, rejection_snapshot, ProcessContext, Stage, StageKind,
    StageReport,
};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &[".gif", ".jpg", ".jpeg", ".png"];
const FOLDER_DATE_FORMAT: &str = "%Y %m %d";

/// Assigns each record its destination sub-folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyStage;

impl ClassifyStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for ClassifyStage {
    fn kind(&self) -> StageKind {
        StageKind::Classify
    }

    fn process(&self, config: &mut ProcessConfig, ctx: &ProcessContext) -> StageReport {
        if !config.destinations().any(|d| d.folders) {
            info!("sub-folders disabled, classification skipped");
            return StageReport::skipped(StageKind::Classify, config.files.len());
        }

        let parallel = config.use_parallel(config.files.len());
        let before = rejection_snapshot(&config.files);
        let reader = ctx.tag_reader.as_ref();
        info!(records = config.files.len(), parallel, "classifying records");

        let result = for_each_record(&mut config.files, parallel, |record| {
            classify_record(record, reader);
            Ok(())
        });

        finish_report(StageKind::Classify, &config.files, &before, 0, result)
    }
}

pub fn is_image(record: &FileRecord) -> bool {
    let extension = record.extension();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

fn classify_record(record: &mut FileRecord, reader: &dyn TagReader) {
    if is_image(record) {
        classify_image(record, reader);
    } else {
        let endpoint = trim_trailing_symbol(record.name()).to_string();
        record.set_endpoint(endpoint);
    }
}

/// Failures here stay on the record; they never abort the stage.
fn classify_image(record: &mut FileRecord, reader: &dyn TagReader) {
    let tags = match reader.read_tags(record.full_path()) {
        Ok(tags) => tags,
        Err(err) => {
            let reason = format!("could not read image {}: {err:#}", record.name());
            warn!(path = %record.full_path().display(), %reason, "image rejected");
            record.reject(reason);
            return;
        }
    };

    let Some(raw) = find_date_tag(&tags) else {
        debug!(path = %record.full_path().display(), "no EXIF date tag");
        record.reject("EXIF date tag not found");
        return;
    };

    let text = tag_text(raw);
    match parse_exif_date(&text) {
        Some(date) => record.set_endpoint(date.format(FOLDER_DATE_FORMAT).to_string()),
        None => {
            debug!(path = %record.full_path().display(), %text, "unparsable EXIF date");
            record.reject(format!("could not parse EXIF date: {text}"));
        }
    }
}
