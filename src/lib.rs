pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod mount;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, ExtractConfig, MountConfig, OutputConfig};
pub use error::{ErrorKind, IsoExtractError, Result, UserFriendlyError};

// Core functionality re-exports
pub use extractor::{
    ExtractionProgress, ExtractionReport, ExtractionRequest, FileOutcome, FileReport,
    SelectiveExtractor,
};
pub use mount::{CommandMounter, MountProvider, MountSession};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::Path;

/// Application wiring: configuration, console output, progress and Ctrl+C handling
/// around a [`SelectiveExtractor`] that shells out to the configured mount programs.
pub struct IsoExtract {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl IsoExtract {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(config.output.show_progress && !quiet);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Create an IsoExtract instance for testing (no signal handler conflicts)
    #[cfg(test)]
    pub fn new_for_test(config: Config, output_mode: OutputMode) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, 0, true),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbosity_level(), cli_args.quiet)
    }

    /// Run the configured extraction with the mount programs from `[mount]`.
    pub fn run(&self) -> Result<ExtractionReport> {
        let mounter = CommandMounter::from_config(&self.config.mount);
        self.run_with(mounter)
    }

    /// Run the configured extraction through an arbitrary mount provider.
    pub fn run_with<M: MountProvider>(&self, mounter: M) -> Result<ExtractionReport> {
        self.shutdown.check_shutdown()?;
        let request = self.config.request()?;

        let extractor = SelectiveExtractor::new(mounter)
            .with_dry_run(self.config.extract.dry_run)
            .with_buffer_size(self.config.output.buffer_size)
            .with_temp_root(self.config.mount.temp_root.clone())
            .with_running_flag(self.shutdown.running_flag());

        if extractor.is_dry_run() {
            self.output_formatter.info("DRY RUN MODE - No files will be written");
        }
        self.output_formatter.start_operation(&format!(
            "Extracting {} file(s) from {}",
            request.files.len(),
            request.image.display()
        ));

        let file_progress = self
            .progress_manager
            .create_file_progress(request.files.len() as u64);
        let progress_callback = {
            let pb = file_progress.clone();
            move |progress: &ExtractionProgress| {
                ui::progress::update_file_progress(&pb, progress);
            }
        };

        match extractor.extract(&request, Some(&progress_callback)) {
            Ok(report) => {
                ui::progress::finish_progress_with_summary(
                    &file_progress,
                    &format!("Compared {} files", report.files.len()),
                    report.duration,
                );
                Ok(report)
            }
            Err(e) => {
                file_progress.abandon();
                Err(e)
            }
        }
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &IsoExtractError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Extract `files` from `image` into `dest` with the default `mount -o loop,ro`
/// and `umount` commands. Returns whether anything changed (or would change,
/// when `dry_run` is set).
pub fn extract<I, D>(image: I, dest: D, files: &[&str], dry_run: bool) -> Result<bool>
where
    I: AsRef<Path>,
    D: AsRef<Path>,
{
    let request = ExtractionRequest::new(image.as_ref(), dest.as_ref(), files.iter().copied());
    let report = SelectiveExtractor::new(CommandMounter::new())
        .with_dry_run(dry_run)
        .extract(&request, None)?;
    Ok(report.changed)
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
