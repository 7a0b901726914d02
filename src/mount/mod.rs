pub mod command;
pub mod session;

pub use command::CommandMounter;
pub use session::MountSession;

use crate::error::Result;
use std::path::Path;

/// Capability to attach a filesystem image as a read-only directory tree.
///
/// Implementations must leave `target` empty and unmounted when `mount` fails,
/// since the caller removes the directory afterwards.
pub trait MountProvider {
    /// Mount `image` read-only at the existing directory `target`.
    fn mount(&self, image: &Path, target: &Path) -> Result<()>;

    /// Detach whatever was mounted at `target`.
    fn unmount(&self, target: &Path) -> Result<()>;
}

impl<M: MountProvider + ?Sized> MountProvider for &M {
    fn mount(&self, image: &Path, target: &Path) -> Result<()> {
        (**self).mount(image, target)
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        (**self).unmount(target)
    }
}
