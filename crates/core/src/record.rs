use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub enum FileStatus {
    Exists,
    Denied,
    Duplicate,
    Missing,
    Rejected,
    #[default]
    Unknown,
}

/// Per-file state shared by every pipeline stage.
///
/// Fields are private so the naming invariants hold: `name` never becomes
/// empty, `original_name`/`original_endpoint` keep the first value they
/// replaced, and `endpoint` is either empty or ends with a separator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileRecord {
    id: u32,
    key: String,
    name: String,
    original_name: Option<String>,
    endpoint: String,
    original_endpoint: Option<String>,
    full_path: PathBuf,
    extension: Option<String>,
    size: u64,
    created: Option<DateTime<Local>>,
    modified: Option<DateTime<Local>>,
    comment: String,
    content_type: String,
    status: FileStatus,
}

impl FileRecord {
    pub fn new(full_path: impl Into<PathBuf>) -> Self {
        let full_path = full_path.into();
        let stem = full_path
            .file_stem()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = full_path
            .extension()
            .map(|v| format!(".{}", v.to_string_lossy()));

        Self {
            key: stem.clone(),
            name: stem,
            extension,
            full_path,
            ..Self::default()
        }
    }

    /// Builds an `Exists` record for a discovered file.
    pub fn from_entry(full_path: &Path, metadata: &fs::Metadata) -> Self {
        let mut record = Self::new(full_path);
        record.size = metadata.len();
        record.created = metadata.created().ok().map(DateTime::from);
        record.modified = metadata.modified().ok().map(DateTime::from);
        record.status = FileStatus::Exists;
        record
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        if self.original_name.is_none() && !self.name.is_empty() {
            self.original_name = Some(std::mem::take(&mut self.name));
        }
        self.name = value;
    }

    pub fn original_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, value: impl Into<String>) {
        let mut value = value.into();
        if !value.is_empty() && !value.ends_with(['/', MAIN_SEPARATOR]) {
            value.push(MAIN_SEPARATOR);
        }
        if self.original_endpoint.is_none() && !self.endpoint.is_empty() {
            self.original_endpoint = Some(std::mem::take(&mut self.endpoint));
        }
        self.endpoint = value;
    }

    pub fn original_endpoint(&self) -> &str {
        self.original_endpoint.as_deref().unwrap_or(&self.endpoint)
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Extension with its leading dot, derived from `name` when none was recorded.
    pub fn extension(&self) -> &str {
        match self.extension.as_deref() {
            Some(ext) if !ext.is_empty() => ext,
            _ => self
                .name
                .rfind('.')
                .map(|pos| &self.name[pos..])
                .unwrap_or_default(),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn created(&self) -> Option<DateTime<Local>> {
        self.created
    }

    pub fn modified(&self) -> Option<DateTime<Local>> {
        self.modified
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn set_status(&mut self, status: FileStatus) {
        self.status = status;
    }

    pub fn exists(&self) -> bool {
        self.status == FileStatus::Exists
    }

    pub fn is_rejected(&self) -> bool {
        self.status == FileStatus::Rejected
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.status = FileStatus::Rejected;
        self.comment = reason.into();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Path::new(&self.endpoint).join(&self.name).display())
    }
}
