use crate::error::{IsoExtractError, Result};
use crate::extractor::ExtractionRequest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub extract: ExtractConfig,
    pub mount: MountConfig,
    pub output: OutputConfig,
}

/// The extraction job itself. Every field may also be supplied on the command line.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    pub files: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MountConfig {
    pub mount_program: String,
    pub mount_args: Vec<String>,
    pub umount_program: String,
    pub umount_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub buffer_size: usize,
    pub show_progress: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_program: "mount".to_string(),
            // `--` keeps image and mountpoint paths from being read as options
            mount_args: vec!["-o".to_string(), "loop,ro".to_string(), "--".to_string()],
            umount_program: "umount".to_string(),
            umount_args: vec!["--".to_string()],
            temp_root: None, // System temp directory
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024, // 64KB
            show_progress: true,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(IsoExtractError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| IsoExtractError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| IsoExtractError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["iso-extract.toml", ".iso-extract.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref image) = cli_args.image {
            self.extract.image = Some(image.clone());
        }

        if let Some(ref dest) = cli_args.dest {
            self.extract.dest = Some(dest.clone());
        }

        // Files given on the command line replace the configured list rather than extend it
        if let Some(ref files) = cli_args.files {
            self.extract.files = files
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if cli_args.dry_run {
            self.extract.dry_run = true;
        }

        if let Some(show_progress) = cli_args.show_progress {
            self.output.show_progress = show_progress;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| IsoExtractError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| IsoExtractError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.mount.mount_program.trim().is_empty() {
            return Err(IsoExtractError::Config {
                message: "mount_program must not be empty".to_string(),
            });
        }

        if self.mount.umount_program.trim().is_empty() {
            return Err(IsoExtractError::Config {
                message: "umount_program must not be empty".to_string(),
            });
        }

        if self.output.buffer_size == 0 {
            return Err(IsoExtractError::Config {
                message: "Buffer size must be greater than 0".to_string(),
            });
        }

        if let Some(ref root) = self.mount.temp_root {
            if !root.is_dir() {
                return Err(IsoExtractError::Config {
                    message: format!("Temporary root is not a directory: {}", root.display()),
                });
            }
        }

        Ok(())
    }

    /// Build the extraction request from the merged configuration.
    pub fn request(&self) -> Result<ExtractionRequest> {
        let image = self.extract.image.clone().ok_or_else(|| IsoExtractError::Config {
            message: "No image given (use --image or set extract.image)".to_string(),
        })?;

        let dest = self.extract.dest.clone().ok_or_else(|| IsoExtractError::Config {
            message: "No destination given (use --dest or set extract.dest)".to_string(),
        })?;

        if self.extract.files.is_empty() {
            return Err(IsoExtractError::Config {
                message: "No files given (use --files or set extract.files)".to_string(),
            });
        }

        Ok(ExtractionRequest::new(image, dest, self.extract.files.clone()))
    }

    pub fn create_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.extract.image = Some(PathBuf::from("/tmp/rear-test.iso"));
        sample_config.extract.dest = Some(PathBuf::from("/tmp/virt-rear"));
        sample_config.extract.files = vec![
            "isolinux/kernel".to_string(),
            "isolinux/initrd.cgz".to_string(),
        ];
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub image: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub files: Option<Vec<String>>,
    pub dry_run: bool,
    pub show_progress: Option<bool>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: Option<PathBuf>) -> Self {
        self.image = image;
        self
    }

    pub fn with_dest(mut self, dest: Option<PathBuf>) -> Self {
        self.dest = dest;
        self
    }

    pub fn with_files(mut self, files: Option<Vec<String>>) -> Self {
        self.files = files;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_show_progress(mut self, show_progress: Option<bool>) -> Self {
        self.show_progress = show_progress;
        self
    }
}
