use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Copied,
    Unchanged,
    /// Would have been copied, but dry-run mode left the destination untouched.
    SkippedDryRun,
}

impl FileOutcome {
    /// Whether this outcome counts toward the aggregate `changed` flag.
    pub fn is_change(self) -> bool {
        !matches!(self, FileOutcome::Unchanged)
    }

    pub fn label(self) -> &'static str {
        match self {
            FileOutcome::Copied => "copied",
            FileOutcome::Unchanged => "unchanged",
            FileOutcome::SkippedDryRun => "would copy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub destination: PathBuf,
    pub outcome: FileOutcome,
    pub source_digest: String,
    pub destination_digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub image: PathBuf,
    pub dest: PathBuf,
    pub changed: bool,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
    pub warnings: Vec<String>,
    pub extraction_time: DateTime<Utc>,
    pub duration: Duration,
}

impl ExtractionReport {
    pub fn count(&self, outcome: FileOutcome) -> usize {
        self.files.iter().filter(|f| f.outcome == outcome).count()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionProgress {
    pub files_processed: usize,
    pub total_files: usize,
    pub files_copied: usize,
    pub current_file: Option<String>,
}

impl ExtractionProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            files_processed: 0,
            total_files,
            files_copied: 0,
            current_file: None,
        }
    }

    pub fn update_file(&mut self, file: String, outcome: FileOutcome) {
        self.files_processed += 1;
        if outcome.is_change() {
            self.files_copied += 1;
        }
        self.current_file = Some(file);
    }
}
