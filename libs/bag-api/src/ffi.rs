use crate::config::{ConfigParam, ConfigValues};

/// Current ABI version. Host checks this against plugin's `bag_abi_version()`.
pub const BAG_ABI_VERSION: u32 = 1;

/// Symbol names every format plugin library exports.
pub const SYM_ABI_VERSION: &[u8] = b"bag_abi_version";
pub const SYM_CONFIG_PARAMS: &[u8] = b"bag_config_params";
pub const SYM_CREATE_FORMAT: &[u8] = b"bag_create_format";

/// FFI return struct from `bag_create_format`.
#[repr(C)]
pub struct PluginCreateResult {
    /// Pointer to the created plugin object (Box<Box<dyn FormatPlugin>>).
    /// Null if creation failed.
    pub plugin_ptr: *mut (),
    /// Pointer to a heap-allocated error string.
    /// Null if creation succeeded.
    pub error_ptr: *mut u8,
    /// Length of the error string.
    pub error_len: usize,
}

/// Type signature for `bag_abi_version` symbol.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Type signature for `bag_config_params` symbol.
/// Returns a pointer to a boxed `Vec<ConfigParam>`. Caller takes ownership.
pub type ConfigParamsFn = unsafe extern "C" fn() -> *mut ();

/// Type signature for `bag_create_format`.
/// Takes a pointer to host-owned `ConfigValues` (plugin borrows, does not own).
pub type CreatePluginFn = unsafe extern "C" fn(*const ()) -> PluginCreateResult;

/// Helper: create a successful `PluginCreateResult` from a trait object.
pub fn plugin_ok<T: ?Sized>(plugin: Box<Box<T>>) -> PluginCreateResult {
    PluginCreateResult {
        plugin_ptr: Box::into_raw(plugin) as *mut (),
        error_ptr: std::ptr::null_mut(),
        error_len: 0,
    }
}

/// Helper: create a failed `PluginCreateResult` from an error message.
pub fn plugin_err(msg: &str) -> PluginCreateResult {
    let bytes = msg.as_bytes().to_vec();
    let len = bytes.len();
    let ptr = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
    PluginCreateResult {
        plugin_ptr: std::ptr::null_mut(),
        error_ptr: ptr,
        error_len: len,
    }
}

/// Helper: return config params from plugin to host.
/// Host will reconstruct as `Box<Vec<ConfigParam>>` and take ownership.
pub fn config_params_ok(params: Vec<ConfigParam>) -> *mut () {
    Box::into_raw(Box::new(params)) as *mut ()
}

/// Cast an FFI config pointer to a `&ConfigValues` reference.
///
/// # Safety
///
/// `ptr` must be a valid pointer to a `ConfigValues` value owned by the host.
pub unsafe fn config_from_ptr<'a>(ptr: *const ()) -> &'a ConfigValues {
    unsafe { &*(ptr as *const ConfigValues) }
}

/// Macro: export all plugin entry points for a format plugin.
///
/// `$config_type` must derive `ConfigParams`; `$ctor` builds the plugin from it:
///
/// ```ignore
/// bag_api::bag_format_plugin!(CdrConfig, CdrFormat::new);
/// ```
#[macro_export]
macro_rules! bag_format_plugin {
    ($config_type:ty, $ctor:path) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn bag_abi_version() -> u32 {
            $crate::ffi::BAG_ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn bag_config_params() -> *mut () {
            $crate::ffi::config_params_ok(<$config_type>::config_params())
        }

        /// # Safety
        ///
        /// `config_ptr` must point to a valid `ConfigValues` owned by the host.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn bag_create_format(
            config_ptr: *const (),
        ) -> $crate::ffi::PluginCreateResult {
            let config = unsafe { $crate::ffi::config_from_ptr(config_ptr) };
            match <$config_type>::from_config(config) {
                Ok(cfg) => $crate::ffi::plugin_ok(Box::new(
                    Box::new($ctor(cfg)) as Box<dyn $crate::format::FormatPlugin>,
                )),
                Err(e) => $crate::ffi::plugin_err(&e.to_string()),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_result_carries_message() {
        let result = plugin_err("bad config");
        assert!(result.plugin_ptr.is_null());
        let msg = unsafe {
            let slice = std::ptr::slice_from_raw_parts_mut(result.error_ptr, result.error_len);
            String::from_utf8(Box::from_raw(slice).into_vec()).unwrap()
        };
        assert_eq!(msg, "bad config");
    }
}
