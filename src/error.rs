use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IsoExtractError {
    #[error("Directory \"{}\" does not exist", path.display())]
    DestinationMissing { path: PathBuf },

    #[error("ISO image \"{}\" does not exist", path.display())]
    ImageMissing { path: PathBuf },

    #[error("Failed to mount ISO image \"{}\": {detail}", image.display())]
    MountFailed { image: PathBuf, detail: String },

    #[error("Cannot read \"{file}\" from the mounted image")]
    SourceFileUnreadable {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to unmount \"{}\": {detail}", mountpoint.display())]
    UnmountFailed { mountpoint: PathBuf, detail: String },

    #[error("Invalid file entry \"{file}\": {reason}")]
    InvalidFileEntry { file: String, reason: &'static str },

    #[error("Cannot read existing destination file \"{}\"", path.display())]
    DestinationUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy \"{file}\" to \"{}\"", destination.display())]
    CopyFailed {
        file: String,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat classification of [`IsoExtractError`] for callers that only need to branch
/// on the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DestinationMissing,
    ImageMissing,
    MountFailed,
    SourceFileUnreadable,
    UnmountFailed,
    InvalidFileEntry,
    DestinationUnreadable,
    CopyFailed,
    Config,
    Cancelled,
    Io,
}

impl IsoExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IsoExtractError::DestinationMissing { .. } => ErrorKind::DestinationMissing,
            IsoExtractError::ImageMissing { .. } => ErrorKind::ImageMissing,
            IsoExtractError::MountFailed { .. } => ErrorKind::MountFailed,
            IsoExtractError::SourceFileUnreadable { .. } => ErrorKind::SourceFileUnreadable,
            IsoExtractError::UnmountFailed { .. } => ErrorKind::UnmountFailed,
            IsoExtractError::InvalidFileEntry { .. } => ErrorKind::InvalidFileEntry,
            IsoExtractError::DestinationUnreadable { .. } => ErrorKind::DestinationUnreadable,
            IsoExtractError::CopyFailed { .. } => ErrorKind::CopyFailed,
            IsoExtractError::Config { .. } => ErrorKind::Config,
            IsoExtractError::Cancelled => ErrorKind::Cancelled,
            IsoExtractError::Io(_) => ErrorKind::Io,
        }
    }

    /// Process exit code used by the binary for this failure.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Cancelled => 130, // Interrupted (SIGINT)
            ErrorKind::DestinationMissing => 3,
            ErrorKind::ImageMissing => 4,
            ErrorKind::MountFailed => 5,
            ErrorKind::SourceFileUnreadable => 6,
            ErrorKind::InvalidFileEntry => 7,
            _ => 1,
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for IsoExtractError {
    fn user_message(&self) -> String {
        match self {
            IsoExtractError::SourceFileUnreadable { file, source } => {
                format!("Cannot read \"{}\" from the image: {}", file, source)
            }
            IsoExtractError::DestinationUnreadable { path, source } => {
                format!("Cannot read existing destination file {}: {}", path.display(), source)
            }
            IsoExtractError::CopyFailed {
                file,
                destination,
                source,
            } => {
                format!(
                    "Failed to copy \"{}\" to {}: {}",
                    file,
                    destination.display(),
                    source
                )
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            IsoExtractError::DestinationMissing { .. } => Some(
                "Create the destination directory first; it is never created automatically.".to_string()
            ),
            IsoExtractError::ImageMissing { .. } => Some(
                "Check the path given with --image; its parent directory must exist.".to_string()
            ),
            IsoExtractError::MountFailed { .. } => Some(
                "Loop mounting usually requires root privileges. Run as root or configure mount_program in the [mount] section.".to_string()
            ),
            IsoExtractError::SourceFileUnreadable { .. } => Some(
                "File paths are relative to the root of the image. Directories cannot be extracted.".to_string()
            ),
            IsoExtractError::UnmountFailed { .. } => Some(
                "The image may still be mounted. Inspect it with `mount` and unmount it manually.".to_string()
            ),
            IsoExtractError::InvalidFileEntry { .. } => Some(
                "Each entry must name a file inside the image, e.g. isolinux/kernel.".to_string()
            ),
            IsoExtractError::DestinationUnreadable { .. } => Some(
                "Files in the destination directory are compared before copying; make sure they are readable regular files.".to_string()
            ),
            IsoExtractError::CopyFailed { .. } => Some(
                "Ensure you have write permission for the destination directory.".to_string()
            ),
            IsoExtractError::Config { .. } => Some(
                "Check your configuration file syntax and ensure image, dest and files are set.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for IsoExtractError {
    fn from(error: toml::de::Error) -> Self {
        IsoExtractError::Config {
            message: error.to_string(),
        }
    }
}

impl From<toml::ser::Error> for IsoExtractError {
    fn from(error: toml::ser::Error) -> Self {
        IsoExtractError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IsoExtractError>;
