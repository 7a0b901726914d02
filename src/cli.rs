use crate::config::{CliOverrides, Config};
use crate::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iso-extract")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract files from an ISO image")]
#[command(
    long_about = "iso-extract mounts an ISO image read-only in a temporary directory and copies \
                  the requested files to a destination directory. Only files whose content \
                  hash differs from the destination copy are written, so repeated runs are idempotent."
)]
#[command(after_help = "EXAMPLES:\n  \
    iso-extract --image /tmp/rear-test.iso --dest /tmp/virt-rear --files isolinux/kernel,isolinux/initrd.cgz\n  \
    iso-extract --image boot.iso --dest out --files EFI/BOOT/BOOTX64.EFI --dry-run\n  \
    iso-extract --config extract.toml --output-format json\n\n\
    Without arguments the job is read from ./iso-extract.toml or ./.iso-extract.toml.")]
pub struct Cli {
    /// The ISO image to extract files from
    #[arg(short, long, visible_aliases = ["path", "src"])]
    pub image: Option<PathBuf>,

    /// The destination directory to extract files to (must exist)
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// Files to extract, relative to the image root (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',', num_args = 1..)]
    pub files: Option<Vec<String>>,

    /// Report what would be copied without writing anything
    #[arg(long, visible_alias = "check")]
    pub dry_run: bool,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        // Progress bars would interleave with machine-readable output
        let show_progress = match self.output_format {
            OutputFormat::Human if !self.quiet => None,
            _ => Some(false),
        };

        CliOverrides::new()
            .with_image(self.image.clone())
            .with_dest(self.dest.clone())
            .with_files(self.files.clone())
            .with_dry_run(self.dry_run)
            .with_show_progress(show_progress)
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
