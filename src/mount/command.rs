use crate::config::MountConfig;
use crate::error::{IsoExtractError, Result};
use crate::mount::MountProvider;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output};

/// Mounts images by running external `mount`/`umount` style programs.
#[derive(Debug, Clone)]
pub struct CommandMounter {
    mount_program: OsString,
    mount_args: Vec<OsString>,
    umount_program: OsString,
    umount_args: Vec<OsString>,
}

impl CommandMounter {
    pub fn new() -> Self {
        Self {
            mount_program: OsString::from("mount"),
            mount_args: vec![
                OsString::from("-o"),
                OsString::from("loop,ro"),
                OsString::from("--"),
            ],
            umount_program: OsString::from("umount"),
            umount_args: vec![OsString::from("--")],
        }
    }

    pub fn from_config(config: &MountConfig) -> Self {
        Self::new()
            .with_mount_program(&config.mount_program)
            .with_mount_args(config.mount_args.iter())
            .with_umount_program(&config.umount_program)
            .with_umount_args(config.umount_args.iter())
    }

    pub fn with_mount_program<S: Into<OsString>>(mut self, program: S) -> Self {
        self.mount_program = program.into();
        self
    }

    pub fn with_mount_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.mount_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_umount_program<S: Into<OsString>>(mut self, program: S) -> Self {
        self.umount_program = program.into();
        self
    }

    pub fn with_umount_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.umount_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn mount_command(&self, image: &Path, target: &Path) -> Command {
        let mut command = Command::new(&self.mount_program);
        command.args(&self.mount_args).arg(image).arg(target);
        command
    }

    fn umount_command(&self, target: &Path) -> Command {
        let mut command = Command::new(&self.umount_program);
        command.args(&self.umount_args).arg(target);
        command
    }
}

impl Default for CommandMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl MountProvider for CommandMounter {
    fn mount(&self, image: &Path, target: &Path) -> Result<()> {
        let mut command = self.mount_command(image, target);
        tracing::debug!("Running mount command: {:?}", command);

        let output = command.output().map_err(|e| IsoExtractError::MountFailed {
            image: image.to_path_buf(),
            detail: format!(
                "failed to execute {}: {}",
                self.mount_program.to_string_lossy(),
                e
            ),
        })?;

        if !output.status.success() {
            return Err(IsoExtractError::MountFailed {
                image: image.to_path_buf(),
                detail: failure_detail(&output),
            });
        }

        tracing::info!("Mounted {} at {}", image.display(), target.display());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        let mut command = self.umount_command(target);
        tracing::debug!("Running unmount command: {:?}", command);

        let output = command.output().map_err(|e| IsoExtractError::UnmountFailed {
            mountpoint: target.to_path_buf(),
            detail: format!(
                "failed to execute {}: {}",
                self.umount_program.to_string_lossy(),
                e
            ),
        })?;

        if !output.status.success() {
            return Err(IsoExtractError::UnmountFailed {
                mountpoint: target.to_path_buf(),
                detail: failure_detail(&output),
            });
        }

        tracing::info!("Unmounted {}", target.display());
        Ok(())
    }
}

/// Best human-readable explanation for a failed command: stderr, then stdout,
/// then the exit status.
fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }

    format!("command exited with {}", output.status)
}
