use std::sync::Arc;

use crate::error::PluginError;
use crate::schema::SchemaResolver;

/// Runtime serializer for one serialization format: performs `bytes ↔ value tree`.
///
/// - `deserialize()`: parses a payload of `type_name` into an introspectable
///   value tree. Self-describing formats may ignore `types`.
/// - `serialize()`: encodes a value tree of `type_name` back into payload bytes.
///
/// Schema-driven formats look up `type_name` (and nested types) in `types`
/// and fail with a `Schema` error when a layout is missing.
pub trait FormatSerializer: Send + Sync {
    fn deserialize(
        &self,
        data: &[u8],
        type_name: &str,
        types: &dyn SchemaResolver,
    ) -> Result<serde_json::Value, PluginError>;

    fn serialize(
        &self,
        value: &serde_json::Value,
        type_name: &str,
        types: &dyn SchemaResolver,
    ) -> Result<Vec<u8>, PluginError>;
}

/// Format plugin, factory for a `FormatSerializer`.
///
/// - `format_id()`: the serialization format identifier this plugin handles
///   (`"cdr"`, `"json"`), matched against topic metadata and converter options.
/// - `serializer()`: creates the serializer, with the plugin's config applied.
pub trait FormatPlugin: Send + Sync {
    fn format_id(&self) -> &str;
    fn serializer(&self) -> Arc<dyn FormatSerializer>;
}

/// Which serialization formats the reader decodes from and hands out.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConverterOptions {
    /// Format used to deserialize records for typed access.
    #[serde(default)]
    pub input_serialization_format: String,
    /// Format raw records are converted to on read. Empty keeps them as recorded.
    #[serde(default)]
    pub output_serialization_format: String,
}

impl ConverterOptions {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input_serialization_format: input.into(),
            output_serialization_format: output.into(),
        }
    }
}
