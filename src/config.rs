use colonia_codec::WriterOptions;
use colonia_net::NetConfig;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "colonia.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Indent written documents; off squeezes them onto one line.
    pub pretty_print_saves: bool,
    /// Trace every tag transition while inspecting documents.
    pub trace_markup: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            pretty_print_saves: true,
            trace_markup: false,
        }
    }
}

impl CodecConfig {
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            pretty: self.pretty_print_saves,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub net: NetConfig,
    pub codec: CodecConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_filter: "warn".to_string(),
            net: NetConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    AppConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                AppConfig::default()
            }
        }
    }
}
