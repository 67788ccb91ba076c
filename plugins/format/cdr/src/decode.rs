use std::io::Cursor;

use byteorder::{ByteOrder, ReadBytesExt};
use serde_json::{Map, Value};

use bag_api::error::PluginError;
use bag_api::schema::{FieldType, SchemaResolver, primitive};
use bag_api::value::float_to_value;

use crate::MAX_DEPTH;

/// Schema-driven CDR reader over a payload body (encapsulation header stripped).
///
/// Alignment is relative to the start of the body.
pub(crate) struct CdrDecoder<'a, 'r> {
    cursor: Cursor<&'a [u8]>,
    types: &'r dyn SchemaResolver,
}

impl<'a, 'r> CdrDecoder<'a, 'r> {
    pub(crate) fn new(body: &'a [u8], types: &'r dyn SchemaResolver) -> Self {
        Self {
            cursor: Cursor::new(body),
            types,
        }
    }

    /// Bytes not consumed by the decode.
    pub(crate) fn remaining(&self) -> &'a [u8] {
        let body = *self.cursor.get_ref();
        let pos = (self.cursor.position() as usize).min(body.len());
        &body[pos..]
    }

    pub(crate) fn message<B: ByteOrder>(
        &mut self,
        type_name: &str,
        depth: usize,
    ) -> Result<Value, PluginError> {
        if depth > MAX_DEPTH {
            return Err(PluginError::schema(format!(
                "'{type_name}' nests deeper than {MAX_DEPTH} levels"
            )));
        }
        let schema = self
            .types
            .resolve(type_name)
            .ok_or_else(|| PluginError::schema(format!("unknown type '{type_name}'")))?;

        let mut object = Map::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let value = self
                .field::<B>(&field.field_type, depth)
                .map_err(|e| e.with_context(format!("{type_name}.{}", field.name)))?;
            object.insert(field.name.clone(), value);
        }
        Ok(Value::Object(object))
    }

    fn field<B: ByteOrder>(&mut self, ft: &FieldType, depth: usize) -> Result<Value, PluginError> {
        let count = match (ft.array_len(), ft.is_sequence()) {
            (Some(len), _) => len,
            (None, true) => {
                self.align(4);
                self.cursor.read_u32::<B>()? as usize
            }
            (None, false) => return self.element::<B>(&ft.name, depth),
        };

        // Every element takes at least one byte; a larger count is corrupt.
        let remaining = self.remaining().len();
        if count > remaining && !self.zero_sized(&ft.name) {
            return Err(PluginError::format(format!(
                "collection of {count} elements exceeds the {remaining} bytes left"
            )));
        }

        let mut items = Vec::with_capacity(count.min(remaining));
        for _ in 0..count {
            items.push(self.element::<B>(&ft.name, depth)?);
        }
        Ok(Value::Array(items))
    }

    fn element<B: ByteOrder>(&mut self, name: &str, depth: usize) -> Result<Value, PluginError> {
        let value = match name {
            primitive::BOOL => Value::Bool(self.cursor.read_u8()? != 0),
            primitive::BYTE | primitive::CHAR | primitive::UINT8 => {
                Value::from(self.cursor.read_u8()?)
            }
            primitive::INT8 => Value::from(self.cursor.read_i8()?),
            primitive::INT16 => {
                self.align(2);
                Value::from(self.cursor.read_i16::<B>()?)
            }
            primitive::UINT16 => {
                self.align(2);
                Value::from(self.cursor.read_u16::<B>()?)
            }
            primitive::INT32 => {
                self.align(4);
                Value::from(self.cursor.read_i32::<B>()?)
            }
            primitive::UINT32 => {
                self.align(4);
                Value::from(self.cursor.read_u32::<B>()?)
            }
            primitive::INT64 => {
                self.align(8);
                Value::from(self.cursor.read_i64::<B>()?)
            }
            primitive::UINT64 => {
                self.align(8);
                Value::from(self.cursor.read_u64::<B>()?)
            }
            primitive::FLOAT32 => {
                self.align(4);
                float_to_value(f64::from(self.cursor.read_f32::<B>()?))
            }
            primitive::FLOAT64 => {
                self.align(8);
                float_to_value(self.cursor.read_f64::<B>()?)
            }
            primitive::STRING => Value::String(self.string::<B>()?),
            nested => self.message::<B>(nested, depth + 1)?,
        };
        Ok(value)
    }

    /// `u32` length including the terminating NUL, then the bytes.
    fn string<B: ByteOrder>(&mut self) -> Result<String, PluginError> {
        self.align(4);
        let len = self.cursor.read_u32::<B>()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let rest = self.remaining();
        if len > rest.len() {
            return Err(PluginError::format(format!(
                "string of {len} bytes exceeds the {} bytes left",
                rest.len()
            )));
        }
        let raw = &rest[..len];
        self.cursor.set_position(self.cursor.position() + len as u64);
        let text = raw.strip_suffix(&[0]).unwrap_or(raw);
        Ok(std::str::from_utf8(text)?.to_string())
    }

    fn align(&mut self, to: u64) {
        let pos = self.cursor.position();
        let pad = (to - pos % to) % to;
        self.cursor.set_position(pos + pad);
    }

    /// A message type without fields occupies no bytes.
    fn zero_sized(&self, name: &str) -> bool {
        self.types.resolve(name).is_some_and(|s| s.fields.is_empty())
    }
}

