use crate::config::ProcessConfig;
use crate::error::{Containment, ErrorSink, PipelineError};
use crate::record::FileRecord;
use crate::stage::{
    finish_report, for_each_record, rejection_snapshot, ProcessContext, Stage, StageKind,
    StageReport,
};
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Moves every record into the destination tree, or the rejected folder.
#[derive(Clone, Default)]
pub struct RelocateStage {
    sink: Option<ErrorSink>,
}

impl RelocateStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(mut self, sink: ErrorSink) -> Self {
        self.sink = Some(sink);
        self
    }
}

struct MovePlan {
    destination: PathBuf,
    rejected_dir: PathBuf,
    append_date: bool,
    date_format: String,
    lower_case: bool,
    now: DateTime<Local>,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl Stage for RelocateStage {
    fn kind(&self) -> StageKind {
        StageKind::Relocate
    }

    fn set_error_sink(&mut self, sink: ErrorSink) {
        self.sink = Some(sink);
    }

    fn process(&self, config: &mut ProcessConfig, ctx: &ProcessContext) -> StageReport {
        // Moves only happen when per-file sub-folders are enabled.
        let Some(destination) = config.destinations().next().filter(|d| d.folders) else {
            info!("sub-folders disabled, relocation skipped");
            return StageReport::skipped(StageKind::Relocate, config.files.len());
        };
        if config.files.is_empty() {
            return StageReport::skipped(StageKind::Relocate, 0);
        }
        if destination.path.as_os_str().is_empty() {
            return StageReport::aborted(
                StageKind::Relocate,
                PipelineError::Config("destination path is empty".to_string()),
            );
        }
        let Some(rejected) = config.rejected() else {
            return StageReport::aborted(
                StageKind::Relocate,
                PipelineError::Config("no rejected path configured".to_string()),
            );
        };
        if let Err(err) = config.validate() {
            return StageReport::aborted(StageKind::Relocate, err);
        }

        let plan = MovePlan {
            destination: destination.path.to_path_buf(),
            rejected_dir: rejected.path.to_path_buf(),
            append_date: rejected.append_date,
            date_format: rejected.format.to_string(),
            lower_case: config.extensions.lower_case,
            now: ctx.now(),
            reserved: Mutex::new(HashSet::new()),
        };
        let parallel = config.use_parallel(config.files.len());
        let containment = Containment::new(self.sink.as_ref(), config.continue_on_error);
        let before = rejection_snapshot(&config.files);
        info!(
            records = config.files.len(),
            parallel,
            destination = %plan.destination.display(),
            "relocating records"
        );

        let result = for_each_record(&mut config.files, parallel, |record| {
            relocate_record(record, &plan, &containment)
        });

        finish_report(
            StageKind::Relocate,
            &config.files,
            &before,
            containment.reported(),
            result,
        )
    }
}

fn relocate_record(
    record: &mut FileRecord,
    plan: &MovePlan,
    containment: &Containment<'_>,
) -> Result<(), PipelineError> {
    let extension = if plan.lower_case {
        record.extension().to_lowercase()
    } else {
        record.extension().to_string()
    };
    let mut target_dir = plan.destination.join(record.endpoint());
    let mut target_name = format!("{}{}", record.name(), extension);

    if let Err(err) = fs::create_dir_all(&target_dir) {
        return containment.reject(
            record,
            format!("could not create {}: {err}", target_dir.display()),
        );
    }

    if !record.is_rejected() && !plan.claim(target_dir.join(&target_name)) {
        debug!(path = %record.full_path().display(), %target_name, "duplicate target");
        record.reject(format!("file is a duplicate: {target_name}"));
    }

    if record.is_rejected() {
        target_dir = plan.rejected_dir.clone();
        if let Err(err) = fs::create_dir_all(&target_dir) {
            return containment.reject(
                record,
                format!("could not create {}: {err}", target_dir.display()),
            );
        }
        if plan.append_date {
            target_name = format!(
                "{}-{}{}",
                record.name(),
                plan.now.format(&plan.date_format),
                extension
            );
        }
        if !plan.claim(target_dir.join(&target_name)) {
            let reason = format!("rejected target already exists: {target_name}");
            return containment.reject(record, reason);
        }
    }

    let target = target_dir.join(&target_name);
    match move_file(record.full_path(), &target) {
        Ok(()) => {
            debug!(from = %record.full_path().display(), to = %target.display(), "moved");
            Ok(())
        }
        Err(err) => {
            warn!(path = %record.full_path().display(), %err, "move failed");
            let reason = format!(
                "could not move {} to {}: {err}",
                record.full_path().display(),
                target.display()
            );
            containment.reject(record, reason)
        }
    }
}

impl MovePlan {
    /// Reserves `target` for this run; false when it exists or is already taken.
    fn claim(&self, target: PathBuf) -> bool {
        let mut reserved = match self.reserved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if reserved.contains(&target) || target.exists() {
            return false;
        }
        reserved.insert(target)
    }
}

/// Rename, falling back to copy + verify + delete across volumes.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to).or_else(|rename_err| {
        if !from.is_file() {
            return Err(rename_err);
        }
        debug!(from = %from.display(), %rename_err, "rename failed, copying instead");
        copy_verified(from, to)
    })
}

fn copy_verified(from: &Path, to: &Path) -> io::Result<()> {
    let source_size = fs::metadata(from)?.len();
    fs::copy(from, to)?;

    let dest_size = fs::metadata(to)?.len();
    if dest_size != source_size {
        if let Err(err) = fs::remove_file(to) {
            warn!(path = %to.display(), %err, "could not remove partial copy");
        }
        return Err(io::Error::other(format!(
            "copy verification failed: source {source_size} bytes, dest {dest_size} bytes"
        )));
    }

    fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathEntry;
    use crate::exif_reader::ExifTagReader;
    use crate::stage::StageOutcome;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    struct Layout {
        _temp: TempDir,
        input: PathBuf,
        library: PathBuf,
        rejected: PathBuf,
    }

    fn layout() -> Layout {
        let temp = tempdir().expect("tempdir");
        let input = temp.path().join("in");
        fs::create_dir_all(&input).expect("create input");
        Layout {
            library: temp.path().join("library"),
            rejected: temp.path().join("rejected"),
            input,
            _temp: temp,
        }
    }

    fn fixed_context() -> ProcessContext {
        let now = Local
            .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .single()
            .expect("valid time");
        ProcessContext::new(Arc::new(ExifTagReader), Arc::new(move || now))
    }

    fn config(layout: &Layout, folders: bool, append_date: bool) -> ProcessConfig {
        ProcessConfig {
            paths: vec![
                PathEntry::Destination {
                    path: layout.library.clone(),
                    folders,
                },
                PathEntry::Rejected {
                    path: layout.rejected.clone(),
                    append_date,
                    format: "%Y%m%d".to_string(),
                },
            ],
            ..ProcessConfig::default()
        }
    }

    fn record(layout: &Layout, file: &str, endpoint: &str) -> FileRecord {
        let path = layout.input.join(file);
        fs::write(&path, file.as_bytes()).expect("write source");
        let mut record = FileRecord::new(path);
        record.set_endpoint(endpoint);
        record
    }

    #[test]
    fn moves_into_endpoint_folder() {
        let layout = layout();
        let mut config = config(&layout, true, false);
        config.files.push(record(&layout, "IMG_0001.JPG", "2015 02 03"));
        config.extensions.lower_case = true;

        let report = RelocateStage::new().process(&mut config, &fixed_context());
        assert_eq!(report.outcome, StageOutcome::Completed);
        assert!(layout.library.join("2015 02 03").join("IMG_0001.jpg").exists());
        assert!(!layout.input.join("IMG_0001.JPG").exists());
    }

    #[test]
    fn keeps_extension_case_without_lower_case() {
        let layout = layout();
        let mut config = config(&layout, true, false);
        config.files.push(record(&layout, "Scan.PNG", "Scan"));

        RelocateStage::new().process(&mut config, &fixed_context());
        assert!(layout.library.join("Scan").join("Scan.PNG").exists());
    }

    #[test]
    fn duplicate_target_goes_to_rejected_folder() {
        let layout = layout();
        let existing = layout.library.join("Report");
        fs::create_dir_all(&existing).expect("create existing");
        fs::write(existing.join("Report.txt"), b"old").expect("write existing");

        let mut config = config(&layout, true, false);
        config.files.push(record(&layout, "Report.txt", "Report"));

        let report = RelocateStage::new().process(&mut config, &fixed_context());
        let moved = &config.files[0];
        assert!(moved.is_rejected());
        assert_eq!(moved.comment(), "file is a duplicate: Report.txt");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(
            fs::read(existing.join("Report.txt")).expect("read existing"),
            b"old"
        );
        assert_eq!(
            fs::read(layout.rejected.join("Report.txt")).expect("read rejected"),
            b"Report.txt"
        );
    }

    #[test]
    fn same_target_within_one_run_is_a_duplicate() {
        let layout = layout();
        let mut config = config(&layout, true, true);
        config.files.push(record(&layout, "a.txt", "docs"));
        let mut second = record(&layout, "b.txt", "docs");
        second.set_name("a");
        config.files.push(second);

        RelocateStage::new().process(&mut config, &fixed_context());
        assert!(layout.library.join("docs").join("a.txt").exists());
        assert!(config.files[1].is_rejected());
        assert!(layout.rejected.join("a-20240506.txt").exists());
    }

    #[test]
    fn previously_rejected_records_get_date_suffix() {
        let layout = layout();
        let mut config = config(&layout, true, true);
        let mut rejected = record(&layout, "IMG_0009.jpg", "");
        rejected.reject("EXIF date tag not found");
        config.files.push(rejected);

        RelocateStage::new().process(&mut config, &fixed_context());
        assert!(layout.rejected.join("IMG_0009-20240506.jpg").exists());
        assert_eq!(config.files[0].comment(), "EXIF date tag not found");
    }

    #[test]
    fn folders_disabled_performs_no_moves() {
        let layout = layout();
        let mut config = config(&layout, false, false);
        config.files.push(record(&layout, "a.txt", "a"));

        let report = RelocateStage::new().process(&mut config, &fixed_context());
        assert_eq!(report.outcome, StageOutcome::Skipped);
        assert!(layout.input.join("a.txt").exists());
        assert!(!layout.library.exists());
    }

    #[test]
    fn missing_rejected_entry_is_fatal() {
        let layout = layout();
        let mut config = ProcessConfig {
            paths: vec![PathEntry::Destination {
                path: layout.library.clone(),
                folders: true,
            }],
            ..ProcessConfig::default()
        };
        config.files.push(record(&layout, "a.txt", "a"));

        let report = RelocateStage::new().process(&mut config, &fixed_context());
        assert!(report.error().is_some_and(PipelineError::is_fatal));
        assert!(layout.input.join("a.txt").exists());
    }

    #[test]
    fn move_failure_is_contained_per_record() {
        let layout = layout();
        let mut config = config(&layout, true, false);
        config.continue_on_error = true;
        let mut vanished = record(&layout, "gone.txt", "gone");
        fs::remove_file(vanished.full_path()).expect("remove source");
        vanished.set_status(crate::record::FileStatus::Exists);
        config.files.push(vanished);
        config.files.push(record(&layout, "kept.txt", "kept"));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stage = RelocateStage::new().on_error(Arc::new(move |_: &PipelineError| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let report = stage.process(&mut config, &fixed_context());
        assert_eq!(report.outcome, StageOutcome::Completed);
        assert_eq!(report.contained, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(config.files[0].is_rejected());
        assert!(layout.library.join("kept").join("kept.txt").exists());
    }

    #[test]
    fn move_failure_aborts_without_containment() {
        let layout = layout();
        let mut config = config(&layout, true, false);
        let vanished = record(&layout, "gone.txt", "gone");
        fs::remove_file(vanished.full_path()).expect("remove source");
        config.files.push(vanished);
        config.files.push(record(&layout, "kept.txt", "kept"));

        let report = RelocateStage::new().process(&mut config, &fixed_context());
        assert!(report.is_aborted());
        assert!(layout.input.join("kept.txt").exists());
    }

    #[test]
    fn parallel_workers_claim_each_target_once() {
        let layout = layout();
        let mut config = config(&layout, true, false);
        config.is_parallel = true;
        config.threshold = 0;
        config.continue_on_error = true;
        for i in 0..48 {
            let mut burst = record(&layout, &format!("burst_{i:02}.jpg"), "burst");
            burst.set_name("shot");
            config.files.push(burst);
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stage = RelocateStage::new().on_error(Arc::new(move |_: &PipelineError| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let report = stage.process(&mut config, &fixed_context());

        assert_eq!(report.outcome, StageOutcome::Completed);
        let landed = fs::read_dir(layout.library.join("burst"))
            .expect("read destination")
            .count();
        assert_eq!(landed, 1);
        assert!(layout.library.join("burst").join("shot.jpg").exists());

        let rejected = config.files.iter().filter(|r| r.is_rejected()).count();
        assert_eq!(rejected, 47);
        assert_eq!(report.rejected.len(), 47);

        // One duplicate wins the rejected slot; the rest stay put and are contained.
        let parked = fs::read_dir(&layout.rejected).expect("read rejected").count();
        assert_eq!(parked, 1);
        assert_eq!(report.contained, 46);
        assert_eq!(calls.load(Ordering::SeqCst), 46);
    }

    #[test]
    fn copy_fallback_moves_content_and_removes_source() {
        let temp = tempdir().expect("tempdir");
        let from = temp.path().join("a.bin");
        let to = temp.path().join("b.bin");
        fs::write(&from, b"payload").expect("write");

        copy_verified(&from, &to).expect("copy");
        assert!(!from.exists());
        assert_eq!(fs::read(&to).expect("read"), b"payload");
    }

    #[test]
    fn copy_fallback_fails_for_missing_source() {
        let temp = tempdir().expect("tempdir");
        let to = temp.path().join("b.bin");

        assert!(copy_verified(&temp.path().join("gone.bin"), &to).is_err());
        assert!(!to.exists());
    }

    #[test]
    fn move_file_moves_content() {
        let temp = tempdir().expect("tempdir");
        let from = temp.path().join("a.bin");
        let to = temp.path().join("b.bin");
        fs::write(&from, b"payload").expect("write");

        move_file(&from, &to).expect("move");
        assert!(!from.exists());
        assert_eq!(fs::read(&to).expect("read"), b"payload");
    }
}
