use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bag_api::format::{FormatPlugin, FormatSerializer};
use bag_format_cdr::CdrFormat;
use bag_format_json::JsonFormat;

use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::plugin_host;

/// Format id → format plugin.
///
/// `cdr` and `json` are linked in. Others come from `[[formats]]` plugin
/// libraries, which stay loaded for the life of the process.
pub struct ConverterFactory {
    formats: HashMap<String, Arc<dyn FormatPlugin>>,
}

impl ConverterFactory {
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register(bag_format_cdr::FORMAT_ID, Arc::new(CdrFormat::default()));
        factory.register(bag_format_json::FORMAT_ID, Arc::new(JsonFormat::default()));
        factory
    }

    /// Builtins plus every `[[formats]]` entry of `config`.
    /// A plugin registered under a builtin's name replaces the builtin.
    pub fn from_config(config: &ReaderConfig) -> Result<Self, ReaderError> {
        let mut factory = Self::with_builtins();
        for entry in &config.formats {
            let ctx = format!("format '{}'", entry.name);
            let plugin_config = entry.config_json()?;
            let plugin = plugin_host::load_format(Path::new(&entry.plugin), plugin_config.as_ref())
                .map_err(|e| e.with_context(&ctx))?;
            if plugin.format_id() != entry.name {
                tracing::warn!(
                    name = %entry.name,
                    format_id = plugin.format_id(),
                    "plugin format id differs from configured name, registering under the name"
                );
            }
            tracing::info!(
                format = %entry.name,
                plugin = %entry.plugin,
                "registered format plugin"
            );
            factory.register(entry.name.clone(), Arc::from(plugin));
        }
        Ok(factory)
    }

    pub fn register(&mut self, format_id: impl Into<String>, plugin: Arc<dyn FormatPlugin>) {
        let format_id = format_id.into();
        if self.formats.insert(format_id.clone(), plugin).is_some() {
            tracing::debug!(format = %format_id, "format replaced");
        }
    }

    pub fn contains(&self, format_id: &str) -> bool {
        self.formats.contains_key(format_id)
    }

    /// Sorted format ids.
    pub fn format_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.formats.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Serializer that reads payloads recorded in `format_id`.
    pub fn load_deserializer(
        &self,
        format_id: &str,
    ) -> Result<Arc<dyn FormatSerializer>, ReaderError> {
        self.lookup(format_id).map(|p| p.serializer())
    }

    /// Serializer that writes payloads in `format_id`.
    pub fn load_serializer(
        &self,
        format_id: &str,
    ) -> Result<Arc<dyn FormatSerializer>, ReaderError> {
        self.lookup(format_id).map(|p| p.serializer())
    }

    fn lookup(&self, format_id: &str) -> Result<&Arc<dyn FormatPlugin>, ReaderError> {
        self.formats.get(format_id).ok_or_else(|| {
            ReaderError::Config(format!(
                "unknown serialization format '{format_id}' (available: {})",
                self.format_ids().join(", ")
            ))
        })
    }
}

impl Default for ConverterFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ConverterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterFactory")
            .field("formats", &self.format_ids())
            .finish()
    }
}
