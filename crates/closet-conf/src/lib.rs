use std::path::Path;

use config::Config;
use config::ConfigError as ExternalConfigError;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
}

/// What happens to a tag whose dispatch failed: the key matched no filter,
/// the filter returned an error, or the tag's live text no longer lexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Leave the tag's text untouched and report it as not ready, so it is
    /// retried in the next pass until the iteration ceiling gives up.
    #[default]
    Retry,
    /// Leave the tag's text untouched and report it as ready.
    Passthrough,
    /// Stop rendering and return the failure to the caller.
    Abort,
}

/// Raw delimiter tokens, validated when the template layer turns them into
/// `Delimiters`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DelimiterSettings {
    pub open: String,
    pub close: String,
    pub sep: String,
    pub sub_sep: String,
}

impl Default for DelimiterSettings {
    fn default() -> Self {
        Self {
            open: "[[".to_string(),
            close: "]]".to_string(),
            sep: "::".to_string(),
            sub_sep: "||".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    /// Keep the filter memory store alive between render calls.
    pub memoize: bool,
    pub on_failure: FailurePolicy,
    pub delimiters: DelimiterSettings,
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("com", "closetengine", "closet")
            .map(|proj_dirs| proj_dirs.config_dir().join("closet.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref())
    }

    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".closet.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("closet.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        tracing::debug!(?settings, "Loaded closet settings");
        Ok(settings)
    }
}
