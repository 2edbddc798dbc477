use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;

fn default_unzip_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Glob patterns excluded from the media walk (e.g. "**/__MACOSX/**").
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Extra root indexed after the archive tree. Defaults to a
    /// `recovered_files` directory next to the input archive when present.
    #[serde(default)]
    pub recovery_dir: Option<String>,

    /// Deadline in seconds for one external `unzip` invocation.
    #[serde(default = "default_unzip_timeout")]
    pub external_unzip_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            recovery_dir: None,
            external_unzip_timeout_secs: default_unzip_timeout(),
        }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
