use crate::error::{IsoExtractError, Result};
use crate::extractor::digest::{copy_content, file_digest};
use crate::extractor::report::{ExtractionProgress, ExtractionReport, FileOutcome, FileReport};
use crate::mount::{MountProvider, MountSession};
use chrono::Utc;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// What to extract: files inside `image`, relative to its root, into the
/// existing directory `dest`. Each file lands at `dest/<basename>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub image: PathBuf,
    pub dest: PathBuf,
    pub files: Vec<String>,
}

impl ExtractionRequest {
    pub fn new<I, D, F, S>(image: I, dest: D, files: F) -> Self
    where
        I: Into<PathBuf>,
        D: Into<PathBuf>,
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: image.into(),
            dest: dest.into(),
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

/// A requested file with its location inside the mount and at the destination.
struct PlannedFile<'r> {
    entry: &'r str,
    relative: &'r Path,
    name: &'r OsStr,
}

pub struct SelectiveExtractor<M: MountProvider> {
    mounter: M,
    dry_run: bool,
    buffer_size: usize,
    temp_root: Option<PathBuf>,
    running: Option<Arc<AtomicBool>>,
}

impl<M: MountProvider> SelectiveExtractor<M> {
    pub fn new(mounter: M) -> Self {
        Self {
            mounter,
            dry_run: false,
            buffer_size: 64 * 1024, // 64KB buffer
            temp_root: None,
            running: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(4096); // Minimum 4KB buffer
        self
    }

    pub fn with_temp_root(mut self, root: Option<PathBuf>) -> Self {
        self.temp_root = root;
        self
    }

    /// Stop between files once `running` is cleared, e.g. by a Ctrl+C handler.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Make every requested file present at the destination with the image's content,
    /// copying only those whose digest differs or that are missing.
    ///
    /// The image is mounted for the duration of the call and always released before
    /// returning. Unmount problems after a successful batch are returned as report
    /// warnings; after a failed batch the original error wins and they are logged.
    pub fn extract(
        &self,
        request: &ExtractionRequest,
        progress_callback: Option<&dyn Fn(&ExtractionProgress)>,
    ) -> Result<ExtractionReport> {
        let start = Instant::now();

        check_preconditions(request)?;
        let planned = plan_files(&request.files)?;

        let session = MountSession::open(&self.mounter, &request.image, self.temp_root.as_deref())?;
        let result = self.process_files(session.path(), &request.dest, &planned, progress_callback);
        let problems = session.close();

        let files = match result {
            Ok(files) => files,
            Err(e) => {
                for problem in &problems {
                    tracing::warn!("Cleanup after failed extraction: {}", problem);
                }
                return Err(e);
            }
        };

        let warnings: Vec<String> = problems
            .iter()
            .map(|problem| {
                tracing::warn!("{}", problem);
                problem.to_string()
            })
            .collect();

        let changed = files.iter().any(|f| f.outcome.is_change());
        tracing::info!(
            "Extraction from {} finished: changed={}",
            request.image.display(),
            changed
        );

        Ok(ExtractionReport {
            image: request.image.clone(),
            dest: request.dest.clone(),
            changed,
            dry_run: self.dry_run,
            files,
            warnings,
            extraction_time: Utc::now(),
            duration: start.elapsed(),
        })
    }

    fn process_files(
        &self,
        mountpoint: &Path,
        dest: &Path,
        planned: &[PlannedFile<'_>],
        progress_callback: Option<&dyn Fn(&ExtractionProgress)>,
    ) -> Result<Vec<FileReport>> {
        let mut progress = ExtractionProgress::new(planned.len());
        let mut reports = Vec::with_capacity(planned.len());

        for file in planned {
            self.check_running()?;

            if let Some(callback) = progress_callback {
                callback(&progress);
            }

            let report = self.process_file(mountpoint, dest, file)?;
            progress.update_file(file.entry.to_string(), report.outcome);
            reports.push(report);
        }

        if let Some(callback) = progress_callback {
            callback(&progress);
        }

        Ok(reports)
    }

    fn process_file(
        &self,
        mountpoint: &Path,
        dest: &Path,
        file: &PlannedFile<'_>,
    ) -> Result<FileReport> {
        let source = mountpoint.join(file.relative);
        let source_digest = file_digest(&source, self.buffer_size).map_err(|e| {
            IsoExtractError::SourceFileUnreadable {
                file: file.entry.to_string(),
                source: e,
            }
        })?;

        let destination = dest.join(file.name);
        let destination_digest = if destination.exists() {
            let digest = file_digest(&destination, self.buffer_size).map_err(|e| {
                IsoExtractError::DestinationUnreadable {
                    path: destination.clone(),
                    source: e,
                }
            })?;
            Some(digest)
        } else {
            None
        };

        tracing::debug!(
            "{}: source {} destination {}",
            file.entry,
            source_digest,
            destination_digest.as_deref().unwrap_or("<absent>")
        );

        let outcome = if destination_digest.as_deref() == Some(source_digest.as_str()) {
            FileOutcome::Unchanged
        } else if self.dry_run {
            tracing::info!("Would copy {} to {}", file.entry, destination.display());
            FileOutcome::SkippedDryRun
        } else {
            let bytes = copy_content(&source, &destination, self.buffer_size).map_err(|e| {
                IsoExtractError::CopyFailed {
                    file: file.entry.to_string(),
                    destination: destination.clone(),
                    source: e,
                }
            })?;
            tracing::info!(
                "Copied {} to {} ({} bytes)",
                file.entry,
                destination.display(),
                bytes
            );
            FileOutcome::Copied
        };

        Ok(FileReport {
            file: file.entry.to_string(),
            destination,
            outcome,
            source_digest,
            destination_digest,
        })
    }

    fn check_running(&self) -> Result<()> {
        match self.running {
            Some(ref running) if !running.load(Ordering::SeqCst) => Err(IsoExtractError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// The destination must be an existing directory and the image's parent
/// directory must exist. The image file itself is left for the mount to reject.
fn check_preconditions(request: &ExtractionRequest) -> Result<()> {
    if !request.dest.is_dir() {
        return Err(IsoExtractError::DestinationMissing {
            path: request.dest.clone(),
        });
    }

    if !image_parent(&request.image).exists() {
        return Err(IsoExtractError::ImageMissing {
            path: request.image.clone(),
        });
    }

    Ok(())
}

fn image_parent(image: &Path) -> &Path {
    match image.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => image,
    }
}

fn plan_files(files: &[String]) -> Result<Vec<PlannedFile<'_>>> {
    files.iter().map(|entry| plan_file(entry)).collect()
}

/// Entries are resolved against the image root, so a leading `/` is ignored and
/// `..` is rejected. Directory-style entries have no basename to copy to.
fn plan_file(entry: &str) -> Result<PlannedFile<'_>> {
    let invalid = |reason| IsoExtractError::InvalidFileEntry {
        file: entry.to_string(),
        reason,
    };

    if entry.ends_with('/') {
        return Err(invalid("directories cannot be extracted"));
    }

    let relative = Path::new(entry.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(invalid("parent directory components are not allowed"));
    }

    let name = relative
        .file_name()
        .ok_or_else(|| invalid("entry does not name a file"))?;

    Ok(PlannedFile {
        entry,
        relative,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    /// Treats the "image" as a directory and copies its tree into the mountpoint.
    #[derive(Default)]
    struct StagedMounter {
        fail_mount: bool,
        fail_unmount: bool,
        mounts: Cell<usize>,
        unmounts: Cell<usize>,
    }

    impl StagedMounter {
        fn active_mounts(&self) -> usize {
            self.mounts.get() - self.unmounts.get()
        }
    }

    fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                fs::create_dir(&target)?;
                copy_tree(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    impl MountProvider for StagedMounter {
        fn mount(&self, image: &Path, target: &Path) -> Result<()> {
            if self.fail_mount || !image.is_dir() {
                return Err(IsoExtractError::MountFailed {
                    image: image.to_path_buf(),
                    detail: "mount: wrong fs type".to_string(),
                });
            }
            copy_tree(image, target)?;
            self.mounts.set(self.mounts.get() + 1);
            Ok(())
        }

        fn unmount(&self, target: &Path) -> Result<()> {
            for entry in fs::read_dir(target)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(path)?;
                } else {
                    fs::remove_file(path)?;
                }
            }
            self.unmounts.set(self.unmounts.get() + 1);
            if self.fail_unmount {
                return Err(IsoExtractError::UnmountFailed {
                    mountpoint: target.to_path_buf(),
                    detail: "umount: target is busy".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        _root: TempDir,
        image: PathBuf,
        dest: PathBuf,
        temp_root: PathBuf,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let root = TempDir::new().unwrap();
            let image = root.path().join("image");
            let dest = root.path().join("dest");
            let temp_root = root.path().join("tmp");
            fs::create_dir(&image).unwrap();
            fs::create_dir(&dest).unwrap();
            fs::create_dir(&temp_root).unwrap();

            for (name, content) in files {
                let path = image.join(name);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(path, content).unwrap();
            }

            Self {
                _root: root,
                image,
                dest,
                temp_root,
            }
        }

        fn extractor<'m>(&self, mounter: &'m StagedMounter) -> SelectiveExtractor<&'m StagedMounter> {
            SelectiveExtractor::new(mounter).with_temp_root(Some(self.temp_root.clone()))
        }

        fn request(&self, files: &[&str]) -> ExtractionRequest {
            ExtractionRequest::new(&self.image, &self.dest, files.iter().copied())
        }

        fn temp_entries(&self) -> usize {
            fs::read_dir(&self.temp_root).unwrap().count()
        }

        fn dest_digest(&self, name: &str) -> String {
            file_digest(&self.dest.join(name), 4096).unwrap()
        }
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let fixture = Fixture::new(&[("isolinux/kernel", "kernel v1"), ("isolinux/initrd.cgz", "initrd")]);
        let mounter = StagedMounter::default();
        let extractor = fixture.extractor(&mounter);
        let request = fixture.request(&["isolinux/kernel", "isolinux/initrd.cgz"]);

        let first = extractor.extract(&request, None).unwrap();
        assert!(first.changed);
        assert_eq!(first.count(FileOutcome::Copied), 2);
        let kernel_digest = fixture.dest_digest("kernel");

        let second = extractor.extract(&request, None).unwrap();
        assert!(!second.changed);
        assert_eq!(second.count(FileOutcome::Unchanged), 2);
        assert_eq!(fixture.dest_digest("kernel"), kernel_digest);
        assert_eq!(fs::read_to_string(fixture.dest.join("initrd.cgz")).unwrap(), "initrd");

        assert_eq!(mounter.active_mounts(), 0);
        assert_eq!(fixture.temp_entries(), 0);
    }

    #[test]
    fn test_dry_run_does_not_mutate() {
        let fixture = Fixture::new(&[("a", "new a"), ("b", "b")]);
        fs::write(fixture.dest.join("a"), "old a").unwrap();
        let mounter = StagedMounter::default();
        let extractor = fixture.extractor(&mounter).with_dry_run(true);

        let report = extractor.extract(&fixture.request(&["a", "b"]), None).unwrap();

        assert!(report.changed);
        assert!(report.dry_run);
        assert_eq!(report.count(FileOutcome::SkippedDryRun), 2);
        assert_eq!(fs::read_to_string(fixture.dest.join("a")).unwrap(), "old a");
        assert!(!fixture.dest.join("b").exists());
        assert_eq!(fs::read_dir(&fixture.dest).unwrap().count(), 1);
    }

    #[test]
    fn test_only_differing_files_are_copied() {
        let fixture = Fixture::new(&[("a", "content X"), ("b", "content Y")]);
        fs::write(fixture.dest.join("a"), "content X").unwrap();
        let digest_before = fixture.dest_digest("a");
        let mounter = StagedMounter::default();

        let report = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["a", "b"]), None)
            .unwrap();

        assert!(report.changed);
        assert_eq!(report.files[0].outcome, FileOutcome::Unchanged);
        assert_eq!(report.files[1].outcome, FileOutcome::Copied);
        assert_eq!(report.files[1].destination_digest, None);
        assert_eq!(fixture.dest_digest("a"), digest_before);
        assert_eq!(fixture.dest_digest("b"), report.files[1].source_digest);
    }

    #[test]
    fn test_basename_collision_keeps_last_entry() {
        let fixture = Fixture::new(&[("dir1/same.txt", "first"), ("dir2/same.txt", "second")]);
        let mounter = StagedMounter::default();

        let report = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["dir1/same.txt", "dir2/same.txt"]), None)
            .unwrap();

        assert_eq!(report.count(FileOutcome::Copied), 2);
        assert_eq!(fs::read_to_string(fixture.dest.join("same.txt")).unwrap(), "second");
        assert!(!fixture.dest.join("dir1").exists());
    }

    #[test]
    fn test_missing_source_cleans_up() {
        let fixture = Fixture::new(&[("a", "a")]);
        let mounter = StagedMounter::default();

        let err = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["a", "not-in-image", "a"]), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceFileUnreadable);
        assert!(err.to_string().contains("not-in-image"));
        assert_eq!(mounter.mounts.get(), 1);
        assert_eq!(mounter.active_mounts(), 0);
        assert_eq!(fixture.temp_entries(), 0);
        // Copies made before the failure stay in place.
        assert!(fixture.dest.join("a").exists());
    }

    #[test]
    fn test_missing_destination_short_circuits() {
        let fixture = Fixture::new(&[("a", "a")]);
        let mounter = StagedMounter::default();
        let request = ExtractionRequest::new(&fixture.image, fixture.dest.join("nope"), ["a"]);

        let err = fixture.extractor(&mounter).extract(&request, None).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationMissing);
        assert_eq!(mounter.mounts.get(), 0);
        assert_eq!(fixture.temp_entries(), 0);
    }

    #[test]
    fn test_missing_image_parent() {
        let fixture = Fixture::new(&[]);
        let mounter = StagedMounter::default();
        let request = ExtractionRequest::new("/nonexistent/dir/boot.iso", &fixture.dest, ["a"]);

        let err = fixture.extractor(&mounter).extract(&request, None).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ImageMissing);
        assert_eq!(fixture.temp_entries(), 0);
    }

    #[test]
    fn test_missing_image_with_existing_parent_reaches_mount() {
        let fixture = Fixture::new(&[]);
        let mounter = StagedMounter::default();
        let request = ExtractionRequest::new(fixture.image.join("absent.iso"), &fixture.dest, ["a"]);

        let err = fixture.extractor(&mounter).extract(&request, None).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MountFailed);
        assert_eq!(fixture.temp_entries(), 0);
    }

    #[test]
    fn test_mount_failure_removes_mountpoint() {
        let fixture = Fixture::new(&[("a", "a")]);
        let mounter = StagedMounter {
            fail_mount: true,
            ..Default::default()
        };

        let err = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["a"]), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MountFailed);
        assert!(err.to_string().contains("wrong fs type"));
        assert_eq!(fixture.temp_entries(), 0);
    }

    #[test]
    fn test_unmount_failure_is_a_warning() {
        let fixture = Fixture::new(&[("a", "a")]);
        let mounter = StagedMounter {
            fail_unmount: true,
            ..Default::default()
        };

        let report = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["a"]), None)
            .unwrap();

        assert!(report.changed);
        assert!(report.has_warnings());
        assert!(report.warnings[0].contains("target is busy"));
    }

    #[test]
    fn test_invalid_entries_rejected_before_mount() {
        let fixture = Fixture::new(&[("a", "a")]);
        let mounter = StagedMounter::default();

        for entry in ["", ".", "..", "isolinux/", "../etc/passwd"] {
            let err = fixture
                .extractor(&mounter)
                .extract(&fixture.request(&["a", entry]), None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFileEntry, "entry {:?}", entry);
        }

        assert_eq!(mounter.mounts.get(), 0);
        assert!(!fixture.dest.join("a").exists());
    }

    #[test]
    fn test_invalid_entry_reasons() {
        let reason = |entry| match plan_file(entry) {
            Err(e) => e.to_string(),
            Ok(_) => panic!("{:?} should be rejected", entry),
        };

        assert!(reason("isolinux/").contains("directories cannot be extracted"));
        assert!(reason("../etc/passwd").contains("parent directory components"));
        assert!(reason("").contains("does not name a file"));
    }

    #[test]
    fn test_batch_error_wins_over_unmount_failure() {
        let fixture = Fixture::new(&[("a", "a")]);
        let mounter = StagedMounter {
            fail_unmount: true,
            ..Default::default()
        };

        let err = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["a", "not-in-image"]), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceFileUnreadable);
        assert!(err.to_string().contains("not-in-image"));
        assert_eq!(mounter.unmounts.get(), 1);
    }

    #[test]
    fn test_unreadable_destination_names_path() {
        let fixture = Fixture::new(&[("isolinux/kernel", "kernel")]);
        // A directory where the copy should land cannot be hashed.
        fs::create_dir(fixture.dest.join("kernel")).unwrap();
        let mounter = StagedMounter::default();

        let err = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["isolinux/kernel"]), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationUnreadable);
        assert!(err.to_string().contains("kernel"));
        assert_eq!(mounter.active_mounts(), 0);
        assert_eq!(fixture.temp_entries(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_destination_is_copy_failure() {
        let fixture = Fixture::new(&[("a", "a")]);
        // Dangling link into a missing directory: absent for the comparison,
        // but creating the file through it fails.
        std::os::unix::fs::symlink(
            fixture.temp_root.join("missing").join("a"),
            fixture.dest.join("a"),
        )
        .unwrap();
        let mounter = StagedMounter::default();

        let err = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["a"]), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CopyFailed);
        assert!(err.to_string().contains("\"a\""));
        assert_eq!(mounter.active_mounts(), 0);
        assert_eq!(fixture.temp_entries(), 0);
    }

    #[test]
    fn test_absolute_entry_resolves_inside_image() {
        let fixture = Fixture::new(&[("isolinux/kernel", "kernel")]);
        let mounter = StagedMounter::default();

        let report = fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["/isolinux/kernel"]), None)
            .unwrap();

        assert!(report.changed);
        assert_eq!(fs::read_to_string(fixture.dest.join("kernel")).unwrap(), "kernel");
    }

    #[test]
    fn test_cancellation_stops_and_cleans_up() {
        let fixture = Fixture::new(&[("a", "a")]);
        let mounter = StagedMounter::default();
        let running = Arc::new(AtomicBool::new(false));

        let err = fixture
            .extractor(&mounter)
            .with_running_flag(running)
            .extract(&fixture.request(&["a"]), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(mounter.active_mounts(), 0);
        assert_eq!(fixture.temp_entries(), 0);
        assert!(!fixture.dest.join("a").exists());
    }

    #[test]
    fn test_progress_callback() {
        let fixture = Fixture::new(&[("a", "a"), ("b", "b")]);
        let mounter = StagedMounter::default();
        let calls = Cell::new(0usize);
        let last_processed = Cell::new(0usize);
        let callback = |progress: &ExtractionProgress| {
            calls.set(calls.get() + 1);
            last_processed.set(progress.files_processed);
        };

        fixture
            .extractor(&mounter)
            .extract(&fixture.request(&["a", "b"]), Some(&callback))
            .unwrap();

        assert_eq!(calls.get(), 3);
        assert_eq!(last_processed.get(), 2);
    }

    #[test]
    fn test_image_parent_of_bare_name() {
        assert_eq!(image_parent(Path::new("boot.iso")), Path::new("."));
        assert_eq!(image_parent(Path::new("/srv/boot.iso")), Path::new("/srv"));
    }
}
