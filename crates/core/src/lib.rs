mod classify;
mod config;
mod discovery;
mod error;
mod exif_reader;
mod pipeline;
mod record;
mod relocate;
mod rename;
mod sanitize;
mod stage;

pub use classify::{is_image, ClassifyStage};
pub use config::{
    app_paths, load_config, parse_config, save_config, AppPaths, Extensions, PathEntry,
    ProcessConfig, Replacement, Replacements, DEFAULT_REJECTED_FORMAT,
};
pub use discovery::DiscoveryStage;
pub use error::{ErrorSink, PipelineError};
pub use exif_reader::{
    find_date_tag, parse_exif_date, tag_text, ExifTagReader, TagMap, TagReader,
    TAG_DATE_TIME, TAG_DATE_TIME_DIGITIZED, TAG_DATE_TIME_ORIGINAL,
};
pub use pipeline::{Pipeline, PipelineReport};
pub use record::{FileRecord, FileStatus};
pub use relocate::{move_file, RelocateStage};
pub use rename::{cleaned_name, RenameStage};
pub use sanitize::{normalize_text, trim_trailing_symbol};
pub use stage::{Clock, ProcessContext, Rejection, Stage, StageKind, StageOutcome, StageReport};
