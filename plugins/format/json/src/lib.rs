use std::sync::Arc;

use bag_api::ConfigParams;
use bag_api::error::PluginError;
use bag_api::format::{FormatPlugin, FormatSerializer};
use bag_api::schema::SchemaResolver;

/// Format id this plugin registers under.
pub const FORMAT_ID: &str = "json";

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, ConfigParams)]
pub struct JsonConfig {
    #[param(description = "Indent serialized payloads")]
    pub pretty: bool,
}

// ═══════════════════════════════════════════════════════════════
//  JsonFormatSerializer
// ═══════════════════════════════════════════════════════════════

/// Self-describing format: payload is one UTF-8 JSON object per record.
/// Layouts are not needed, so `types` is ignored.
struct JsonFormatSerializer {
    pretty: bool,
}

impl FormatSerializer for JsonFormatSerializer {
    fn deserialize(
        &self,
        data: &[u8],
        type_name: &str,
        _types: &dyn SchemaResolver,
    ) -> Result<serde_json::Value, PluginError> {
        let text = std::str::from_utf8(data)?;
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| PluginError::format(format!("json deserialize '{type_name}': {e}")))?;
        if !value.is_object() {
            return Err(PluginError::format(format!(
                "json deserialize '{type_name}': payload is not an object"
            )));
        }
        Ok(value)
    }

    fn serialize(
        &self,
        value: &serde_json::Value,
        type_name: &str,
        _types: &dyn SchemaResolver,
    ) -> Result<Vec<u8>, PluginError> {
        if !value.is_object() {
            return Err(PluginError::format(format!(
                "json serialize '{type_name}': value is not an object"
            )));
        }
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }
}

// ═══════════════════════════════════════════════════════════════
//  JsonFormat (plugin)
// ═══════════════════════════════════════════════════════════════

pub struct JsonFormat {
    serializer: Arc<JsonFormatSerializer>,
}

impl JsonFormat {
    pub fn new(config: JsonConfig) -> Self {
        Self {
            serializer: Arc::new(JsonFormatSerializer {
                pretty: config.pretty,
            }),
        }
    }
}

impl Default for JsonFormat {
    fn default() -> Self {
        Self::new(JsonConfig::default())
    }
}

impl FormatPlugin for JsonFormat {
    fn format_id(&self) -> &str {
        FORMAT_ID
    }

    fn serializer(&self) -> Arc<dyn FormatSerializer> {
        self.serializer.clone()
    }
}

// ═══════════════════════════════════════════════════════════════
//  FFI
// ═══════════════════════════════════════════════════════════════

#[cfg(feature = "ffi")]
bag_api::bag_format_plugin!(JsonConfig, JsonFormat::new);
