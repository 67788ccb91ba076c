//! CDR serialization format (OMG XCDR1, as written by ROS 2 middlewares).
//!
//! Payload layout: a 4-byte encapsulation header followed by the message
//! body. Primitives are aligned to their own size relative to the start of
//! the body; strings are a `u32` length (including the NUL terminator)
//! followed by the bytes; sequences are a `u32` count followed by the
//! elements; fixed arrays carry no count.
//!
//! CDR is not self-describing: the layout of every type comes from the
//! `SchemaResolver` passed in by the reader.

mod decode;
mod encode;

use std::sync::Arc;

use byteorder::{BigEndian, LittleEndian};

use bag_api::ConfigParams;
use bag_api::error::PluginError;
use bag_api::format::{FormatPlugin, FormatSerializer};
use bag_api::schema::SchemaResolver;

use decode::CdrDecoder;
use encode::CdrEncoder;

/// Format id this plugin registers under.
pub const FORMAT_ID: &str = "cdr";

/// Encapsulation header for little-endian plain CDR.
pub const CDR_LE_HEADER: [u8; 4] = [0x00, 0x01, 0x00, 0x00];
const CDR_BE: u8 = 0x00;
const CDR_LE: u8 = 0x01;

/// Nested message depth limit; guards against self-referencing layouts.
pub(crate) const MAX_DEPTH: usize = 64;

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, ConfigParams)]
pub struct CdrConfig {
    #[param(
        description = "Reject payloads with bytes left after the message (beyond alignment padding)"
    )]
    pub strict_trailing: bool,
}

// ═══════════════════════════════════════════════════════════════
//  CdrFormatSerializer
// ═══════════════════════════════════════════════════════════════

struct CdrFormatSerializer {
    strict_trailing: bool,
}

impl FormatSerializer for CdrFormatSerializer {
    fn deserialize(
        &self,
        data: &[u8],
        type_name: &str,
        types: &dyn SchemaResolver,
    ) -> Result<serde_json::Value, PluginError> {
        if data.len() < CDR_LE_HEADER.len() {
            return Err(PluginError::format(format!(
                "cdr deserialize '{type_name}': payload of {} bytes has no encapsulation header",
                data.len()
            )));
        }
        let (header, body) = data.split_at(CDR_LE_HEADER.len());

        let mut decoder = CdrDecoder::new(body, types);
        let value = match header[1] {
            CDR_LE if header[0] == 0 => decoder.message::<LittleEndian>(type_name, 0),
            CDR_BE if header[0] == 0 => decoder.message::<BigEndian>(type_name, 0),
            _ => {
                return Err(PluginError::format(format!(
                    "cdr deserialize '{type_name}': unsupported encapsulation {:02x}{:02x}",
                    header[0], header[1]
                )));
            }
        }
        .map_err(|e| e.with_context(format!("cdr deserialize '{type_name}'")))?;

        let rest = decoder.remaining();
        if self.strict_trailing && (rest.len() > 3 || rest.iter().any(|b| *b != 0)) {
            return Err(PluginError::format(format!(
                "cdr deserialize '{type_name}': {} trailing bytes",
                rest.len()
            )));
        }
        Ok(value)
    }

    fn serialize(
        &self,
        value: &serde_json::Value,
        type_name: &str,
        types: &dyn SchemaResolver,
    ) -> Result<Vec<u8>, PluginError> {
        let mut encoder = CdrEncoder::new(types);
        encoder
            .message(value, type_name, 0)
            .map_err(|e| e.with_context(format!("cdr serialize '{type_name}'")))?;

        let body = encoder.into_body();
        let mut out = Vec::with_capacity(CDR_LE_HEADER.len() + body.len());
        out.extend_from_slice(&CDR_LE_HEADER);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════
//  CdrFormat (plugin)
// ═══════════════════════════════════════════════════════════════

pub struct CdrFormat {
    serializer: Arc<CdrFormatSerializer>,
}

impl CdrFormat {
    pub fn new(config: CdrConfig) -> Self {
        Self {
            serializer: Arc::new(CdrFormatSerializer {
                strict_trailing: config.strict_trailing,
            }),
        }
    }
}

impl Default for CdrFormat {
    fn default() -> Self {
        Self::new(CdrConfig::default())
    }
}

impl FormatPlugin for CdrFormat {
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
bag_api::bag_format_plugin!(CdrConfig, CdrFormat::new);
