use serde::Deserialize;

use bag_api::format::ConverterOptions;
use bag_api::storage::StorageOptions;

use crate::error::ReaderError;

/// Record stream backend used when none is configured.
pub const DEFAULT_STORAGE_ID: &str = "jsonl";
/// Serialization format used when none is configured (ROS 2 wire default).
pub const DEFAULT_SERIALIZATION_FORMAT: &str = "cdr";

/// Reader configuration, parsed from TOML.
///
/// ```toml
/// storage_id = "jsonl"
///
/// [converter]
/// input_serialization_format = "cdr"
///
/// [[formats]]
/// name = "msgpack"
/// plugin = "/usr/lib/bag/libbag_format_msgpack.so"
/// config = { strict = true }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    /// Record stream backend.
    #[serde(default = "default_storage_id")]
    pub storage_id: String,

    #[serde(default = "default_converter_options")]
    pub converter: ConverterOptions,

    /// Extra format plugins, loaded from shared libraries.
    #[serde(default)]
    pub formats: Vec<FormatConfig>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            storage_id: default_storage_id(),
            converter: default_converter_options(),
            formats: Vec::new(),
        }
    }
}

fn default_storage_id() -> String {
    DEFAULT_STORAGE_ID.to_string()
}

/// Converter options of `open(path)`: read and deserialize CDR, no conversion.
pub fn default_converter_options() -> ConverterOptions {
    ConverterOptions::new(DEFAULT_SERIALIZATION_FORMAT, "")
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatConfig {
    /// Format id the plugin is registered under.
    pub name: String,
    /// Path to the format plugin library.
    pub plugin: String,
    #[serde(default)]
    pub config: Option<toml::Value>,
}

impl FormatConfig {
    /// Plugin config as a format-independent value for validation.
    pub fn config_json(&self) -> Result<Option<serde_json::Value>, ReaderError> {
        self.config
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ReaderError::Config(format!("format '{}': {e}", self.name)))
    }
}

impl ReaderConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ReaderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReaderError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ReaderError> {
        toml::from_str(toml_str).map_err(|e| ReaderError::Config(e.to_string()))
    }

    pub fn storage_options(&self, uri: impl Into<String>) -> StorageOptions {
        StorageOptions::new(uri, self.storage_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = ReaderConfig::parse("").unwrap();
        assert_eq!(cfg.storage_id, "jsonl");
        assert_eq!(cfg.converter.input_serialization_format, "cdr");
        assert_eq!(cfg.converter.output_serialization_format, "");
        assert!(cfg.formats.is_empty());
    }

    #[test]
    fn formats_section() {
        let cfg = ReaderConfig::parse(
            r#"
            storage_id = "memory"

            [converter]
            input_serialization_format = "json"
            output_serialization_format = "cdr"

            [[formats]]
            name = "msgpack"
            plugin = "/opt/bag/libmsgpack.so"
            config = { strict = true, depth = 4 }
            "#,
        )
        .unwrap();

        assert_eq!(cfg.storage_options("/bags/a").storage_id, "memory");
        assert_eq!(cfg.converter.input_serialization_format, "json");
        assert_eq!(cfg.formats.len(), 1);
        let json = cfg.formats[0].config_json().unwrap().unwrap();
        assert_eq!(json["strict"], serde_json::json!(true));
        assert_eq!(json["depth"], serde_json::json!(4));
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let err = ReaderConfig::parse("storage_id = [").unwrap_err();
        assert!(matches!(err, ReaderError::Config(_)));
    }
}
