use crate::error::{IsoExtractError, Result};
use crate::mount::MountProvider;
use std::fs;
use std::path::{Path, PathBuf};

const MOUNTPOINT_PREFIX: &str = "iso-extract.";

/// A read-only mount of an image at a private temporary directory.
///
/// The mount and the directory are released together, either explicitly through
/// [`MountSession::close`] or when the session is dropped. The directory is
/// removed with `remove_dir`, never recursively, so a mount that failed to detach
/// cannot have its contents deleted.
pub struct MountSession<'a, M: MountProvider + ?Sized> {
    provider: &'a M,
    mountpoint: PathBuf,
    mounted: bool,
    released: bool,
}

impl<'a, M: MountProvider + ?Sized> MountSession<'a, M> {
    /// Create a fresh mountpoint (under `temp_root`, or the system temp dir) and
    /// mount `image` there. On mount failure the directory is removed before the
    /// error is returned.
    pub fn open(provider: &'a M, image: &Path, temp_root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(MOUNTPOINT_PREFIX);
        let dir = match temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let mountpoint = dir.keep();
        tracing::debug!("Created mountpoint {}", mountpoint.display());

        if let Err(e) = provider.mount(image, &mountpoint) {
            if let Err(cleanup) = fs::remove_dir(&mountpoint) {
                tracing::warn!(
                    "Failed to remove mountpoint {}: {}",
                    mountpoint.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        Ok(Self {
            provider,
            mountpoint,
            mounted: true,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmount and remove the mountpoint, returning every problem encountered.
    /// An empty vector means the session was released cleanly.
    pub fn close(mut self) -> Vec<IsoExtractError> {
        self.release()
    }

    fn release(&mut self) -> Vec<IsoExtractError> {
        let mut problems = Vec::new();
        if self.released {
            return problems;
        }
        self.released = true;

        if self.mounted {
            match self.provider.unmount(&self.mountpoint) {
                Ok(()) => self.mounted = false,
                Err(e) => problems.push(e),
            }
        }

        if let Err(e) = fs::remove_dir(&self.mountpoint) {
            problems.push(IsoExtractError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to remove mountpoint {}: {}",
                    self.mountpoint.display(),
                    e
                ),
            )));
        }

        problems
    }
}

impl<M: MountProvider + ?Sized> Drop for MountSession<'_, M> {
    fn drop(&mut self) {
        for problem in self.release() {
            tracing::warn!("Cleanup after extraction failed: {}", problem);
        }
    }
}
