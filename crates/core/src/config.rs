use crate::error::PipelineError;
use crate::record::FileRecord;
use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REJECTED_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub continue_on_error: bool,
    pub is_parallel: bool,
    pub threshold: i32,
    pub extensions: Extensions,
    pub paths: Vec<PathEntry>,
    pub replacements: Replacements,
    #[serde(skip)]
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Extensions {
    pub lower_case: bool,
    pub values: BTreeSet<String>,
}

impl Extensions {
    /// An empty filter accepts every extension.
    pub fn accepts(&self, extension: &str) -> bool {
        self.values.is_empty() || self.values.contains(&normalize_extension(extension))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PathEntry {
    Source {
        path: PathBuf,
        #[serde(default)]
        recursive: bool,
    },
    Destination {
        path: PathBuf,
        #[serde(default)]
        folders: bool,
    },
    Rejected {
        path: PathBuf,
        #[serde(default)]
        append_date: bool,
        #[serde(default = "default_rejected_format")]
        format: String,
    },
    Log {
        path: PathBuf,
        #[serde(default)]
        enabled: bool,
    },
}

impl PathEntry {
    pub fn path(&self) -> &Path {
        match self {
            Self::Source { path, .. }
            | Self::Destination { path, .. }
            | Self::Rejected { path, .. }
            | Self::Log { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Replacements {
    pub normalize: bool,
    pub table: Vec<Replacement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Replacement {
    pub find: String,
    #[serde(default = "default_replacement")]
    pub with: String,
}

impl Replacement {
    pub fn new(find: impl Into<String>, with: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            with: with.into(),
        }
    }
}

fn default_rejected_format() -> String {
    DEFAULT_REJECTED_FORMAT.to_string()
}

fn default_replacement() -> String {
    " ".to_string()
}

fn normalize_extension(value: &str) -> String {
    value.trim().trim_start_matches('.').to_lowercase()
}

pub(crate) struct DestinationView<'a> {
    pub path: &'a Path,
    pub folders: bool,
}

pub(crate) struct RejectedView<'a> {
    pub path: &'a Path,
    pub append_date: bool,
    pub format: &'a str,
}

impl ProcessConfig {
    /// Parallel gate shared by every stage.
    pub fn use_parallel(&self, count: usize) -> bool {
        if !self.is_parallel || self.threshold < 0 {
            return false;
        }
        count >= self.threshold as usize
    }

    pub fn sources(&self) -> impl Iterator<Item = (&Path, bool)> {
        self.paths.iter().filter_map(|entry| match entry {
            PathEntry::Source { path, recursive } => Some((path.as_path(), *recursive)),
            _ => None,
        })
    }

    pub(crate) fn destinations(&self) -> impl Iterator<Item = DestinationView<'_>> {
        self.paths.iter().filter_map(|entry| match entry {
            PathEntry::Destination { path, folders } => Some(DestinationView {
                path,
                folders: *folders,
            }),
            _ => None,
        })
    }

    pub(crate) fn rejected(&self) -> Option<RejectedView<'_>> {
        self.paths.iter().find_map(|entry| match entry {
            PathEntry::Rejected {
                path,
                append_date,
                format,
            } => Some(RejectedView {
                path,
                append_date: *append_date,
                format,
            }),
            _ => None,
        })
    }

    /// First enabled log target, if any.
    pub fn log_path(&self) -> Option<&Path> {
        self.paths.iter().find_map(|entry| match entry {
            PathEntry::Log {
                path,
                enabled: true,
            } if !path.as_os_str().is_empty() => Some(path.as_path()),
            _ => None,
        })
    }

    /// Lower-cases extension values and drops leading dots, as the loader does.
    pub fn normalize(&mut self) {
        self.extensions.values = std::mem::take(&mut self.extensions.values)
            .into_iter()
            .map(|v| normalize_extension(&v))
            .filter(|v| !v.is_empty())
            .collect();
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if let Some(rejected) = self.rejected() {
            let invalid = StrftimeItems::new(rejected.format).any(|item| matches!(item, Item::Error));
            if invalid || rejected.format.is_empty() {
                return Err(PipelineError::Config(format!(
                    "invalid rejected date format: {:?}",
                    rejected.format
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "fsorter", "fsorter")
        .context("could not resolve the OS configuration directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("process.toml"),
        config_dir,
    })
}

pub fn load_config(path: &Path) -> Result<ProcessConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read configuration file: {}", path.display()))?;
    parse_config(&raw)
        .with_context(|| format!("invalid configuration file: {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<ProcessConfig> {
    let mut config =
        toml::from_str::<ProcessConfig>(raw).context("failed to parse configuration")?;
    config.normalize();
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &ProcessConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("could not create configuration directory: {}", parent.display())
        })?;
    }
    let body = toml::to_string_pretty(config).context("failed to serialize configuration")?;
    fs::write(path, body)
        .with_context(|| format!("could not write configuration file: {}", path.display()))?;
    Ok(())
}
