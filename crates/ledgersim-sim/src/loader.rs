//! Configuration loader with multi-source merging

use std::env;
use std::path::{Path, PathBuf};

use crate::{SimConfig, SimError};

/// Project-level config file name.
pub const PROJECT_CONFIG_FILE: &str = "ledgersim.toml";

/// Loads [`SimConfig`] from layered sources.
///
/// Precedence, lowest first: built-in defaults, `ledgersim.toml` in the
/// project directory, an explicit file, then `LEDGERSIM_*` environment
/// variables (`LEDGERSIM_SEED`, `LEDGERSIM_NUM_BLOCKS`, `LEDGERSIM_ENABLED`, ...).
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    explicit_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "LEDGERSIM".to_string(),
            explicit_file: None,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "LEDGERSIM")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Add a config file that must exist
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<SimConfig, SimError> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = SimConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. Project config (ledgersim.toml)
        let project_file = self.project_dir.join(PROJECT_CONFIG_FILE);
        if project_file.exists() {
            builder = builder.add_source(
                config::File::from(project_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Explicit file (--config)
        if let Some(path) = self.explicit_file {
            builder = builder.add_source(
                config::File::from(path)
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Environment variables (LEDGERSIM_*), flat keys
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix).try_parsing(true),
        );

        let config: SimConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
