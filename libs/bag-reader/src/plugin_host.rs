use std::collections::{HashMap, HashSet};
use std::path::Path;

use libloading::{Library, Symbol};

use bag_api::config::{ConfigParam, ConfigValues, ParamType, ParamValue};
use bag_api::ffi::{
    AbiVersionFn, BAG_ABI_VERSION, ConfigParamsFn, CreatePluginFn, PluginCreateResult,
    SYM_ABI_VERSION, SYM_CONFIG_PARAMS, SYM_CREATE_FORMAT,
};
use bag_api::format::FormatPlugin;

use crate::error::ReaderError;

/// A loaded format plugin library with ABI version already verified.
pub struct PluginLib {
    lib: Library,
    config_params_fn: ConfigParamsFn,
    create_fn: CreatePluginFn,
}

impl PluginLib {
    /// Load a plugin library from `path`, verify ABI version, resolve symbols.
    pub fn load(path: &Path) -> Result<Self, ReaderError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            ReaderError::Config(format!("failed to load plugin '{}': {e}", path.display()))
        })?;

        let abi_fn: Symbol<AbiVersionFn> = unsafe { lib.get(SYM_ABI_VERSION) }.map_err(|e| {
            ReaderError::Config(format!(
                "plugin '{}' missing bag_abi_version symbol: {e}",
                path.display()
            ))
        })?;

        let plugin_abi = unsafe { abi_fn() };
        if plugin_abi != BAG_ABI_VERSION {
            return Err(ReaderError::Config(format!(
                "plugin '{}' ABI version mismatch: plugin={plugin_abi}, host={BAG_ABI_VERSION}",
                path.display()
            )));
        }

        let config_params_fn: ConfigParamsFn =
            *unsafe { lib.get::<ConfigParamsFn>(SYM_CONFIG_PARAMS) }.map_err(|e| {
                ReaderError::Config(format!(
                    "plugin '{}' missing bag_config_params symbol: {e}",
                    path.display()
                ))
            })?;

        let create_fn: CreatePluginFn = *unsafe { lib.get::<CreatePluginFn>(SYM_CREATE_FORMAT) }
            .map_err(|e| {
                ReaderError::Config(format!(
                    "plugin '{}' missing bag_create_format symbol: {e}",
                    path.display()
                ))
            })?;

        Ok(Self {
            lib,
            config_params_fn,
            create_fn,
        })
    }

    /// Get plugin's declared config parameters.
    pub fn config_params(&self) -> Vec<ConfigParam> {
        let ptr = unsafe { (self.config_params_fn)() };
        if ptr.is_null() {
            return Vec::new();
        }
        unsafe { *Box::from_raw(ptr as *mut Vec<ConfigParam>) }
    }

    /// Call the plugin's create function with validated ConfigValues.
    fn create(&self, config: &ConfigValues) -> Result<*mut (), ReaderError> {
        let result: PluginCreateResult =
            unsafe { (self.create_fn)(config as *const ConfigValues as *const ()) };

        if result.plugin_ptr.is_null() {
            let msg = if !result.error_ptr.is_null() && result.error_len > 0 {
                // Take back the error string allocated by the plugin.
                let bytes = unsafe {
                    Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                        result.error_ptr,
                        result.error_len,
                    ))
                };
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                "unknown error".to_string()
            };
            return Err(ReaderError::Config(format!("plugin create failed: {msg}")));
        }

        Ok(result.plugin_ptr)
    }
}

// ---------------------------------------------------------------------------
// Config parsing & validation
// ---------------------------------------------------------------------------

/// Parse plugin config into typed key-value pairs.
///
/// `config` is the `[[formats]].config` table, already converted to a
/// `serde_json::Value` by the config loader.
///
/// - Rejects unknown keys (not declared in `params`).
/// - Converts `serde_json::Value` → `ParamValue` based on declared `ParamType`.
///
/// Returns only the keys that are present in the config source.
/// Defaults and required-checks are handled by `validate_and_build`.
pub fn parse_plugin_config(
    config: Option<&serde_json::Value>,
    params: &[ConfigParam],
) -> Result<HashMap<String, ParamValue>, ReaderError> {
    let obj = match config {
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => {
            return Err(ReaderError::Config(
                "plugin config must be a table/object".into(),
            ));
        }
        None => return Ok(HashMap::new()),
    };

    let known: HashSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
    if let Some(key) = obj.keys().find(|k| !known.contains(k.as_str())) {
        return Err(ReaderError::Config(format!("unknown parameter '{key}'")));
    }

    let mut result = HashMap::new();
    for param in params {
        if let Some(v) = obj.get(&param.name) {
            let pv = value_to_param_value(v, param)?;
            result.insert(param.name.clone(), pv);
        }
    }

    Ok(result)
}

/// Build `ConfigValues` from parsed key-value pairs.
///
/// For each declared param:
/// - If present in `parsed`: use the value.
/// - If absent with default: use default value.
/// - If absent and required: return error.
pub fn validate_and_build(
    parsed: &HashMap<String, ParamValue>,
    params: &[ConfigParam],
) -> Result<ConfigValues, ReaderError> {
    let mut values = ConfigValues::new();

    for param in params {
        match (parsed.get(&param.name), &param.default) {
            (Some(v), _) => values.set(&param.name, v.clone()),
            (None, Some(default)) => values.set(&param.name, default.clone()),
            (None, None) if param.required => {
                return Err(ReaderError::Config(format!(
                    "missing required parameter '{}'",
                    param.name
                )));
            }
            (None, None) => {}
        }
    }

    Ok(values)
}

/// Convert a single value to a ParamValue according to the declared type.
fn value_to_param_value(
    val: &serde_json::Value,
    param: &ConfigParam,
) -> Result<ParamValue, ReaderError> {
    let expected =
        |what: &str| ReaderError::Config(format!("parameter '{}': expected {what}", param.name));
    match param.param_type {
        ParamType::Bool => val.as_bool().map(ParamValue::Bool).ok_or_else(|| expected("bool")),
        ParamType::I64 => val.as_i64().map(ParamValue::I64).ok_or_else(|| expected("integer")),
        ParamType::U64 => {
            if let Some(u) = val.as_u64() {
                return Ok(ParamValue::U64(u));
            }
            match val.as_i64() {
                Some(i) => Err(ReaderError::Config(format!(
                    "parameter '{}': expected non-negative integer, got {i}",
                    param.name
                ))),
                None => Err(expected("integer")),
            }
        }
        ParamType::F64 => val.as_f64().map(ParamValue::F64).ok_or_else(|| expected("float")),
        ParamType::Str => Ok(ParamValue::Str(flatten_value(val))),
    }
}

/// Flatten a value into a string for flat config transport.
///
/// Scalars are converted directly (no quoting).
/// Arrays and objects are serialized as JSON strings.
fn flatten_value(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Load a `FormatPlugin` from a shared library.
///
/// 1. Load library, verify ABI version.
/// 2. Call `bag_config_params()` to get declared params.
/// 3. Parse config → raw values, validate, build ConfigValues.
/// 4. Call `bag_create_format(&config_values)`.
pub fn load_format(
    path: &Path,
    config: Option<&serde_json::Value>,
) -> Result<Box<dyn FormatPlugin>, ReaderError> {
    let lib = PluginLib::load(path)?;
    let params = lib.config_params();
    let raw = parse_plugin_config(config, &params)?;
    let config_values = validate_and_build(&raw, &params)?;
    let ptr = lib.create(&config_values)?;
    // Safety: the plugin returned a Box<Box<dyn FormatPlugin>>, we reconstruct it.
    let plugin = unsafe { *Box::from_raw(ptr as *mut Box<dyn FormatPlugin>) };
    tracing::debug!(plugin = %path.display(), format = plugin.format_id(), "loaded format plugin");
    // Serializers handed out by the plugin point into the library: keep it loaded.
    std::mem::forget(lib.lib);
    Ok(plugin)
}
