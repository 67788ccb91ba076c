use byteorder::{LittleEndian, WriteBytesExt};
use serde_json::Value;

use bag_api::error::PluginError;
use bag_api::schema::{FieldType, SchemaResolver, primitive};
use bag_api::value::value_to_float;

use crate::MAX_DEPTH;

/// Schema-driven little-endian CDR writer. Produces the body only; the
/// caller prepends the encapsulation header.
pub(crate) struct CdrEncoder<'r> {
    body: Vec<u8>,
    types: &'r dyn SchemaResolver,
}

impl<'r> CdrEncoder<'r> {
    pub(crate) fn new(types: &'r dyn SchemaResolver) -> Self {
        Self {
            body: Vec::new(),
            types,
        }
    }

    pub(crate) fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub(crate) fn message(
        &mut self,
        value: &Value,
        type_name: &str,
        depth: usize,
    ) -> Result<(), PluginError> {
        if depth > MAX_DEPTH {
            return Err(PluginError::schema(format!(
                "'{type_name}' nests deeper than {MAX_DEPTH} levels"
            )));
        }
        let schema = self
            .types
            .resolve(type_name)
            .ok_or_else(|| PluginError::schema(format!("unknown type '{type_name}'")))?;
        let object = value
            .as_object()
            .ok_or_else(|| PluginError::format(format!("'{type_name}' value is not an object")))?;

        for field in &schema.fields {
            let ctx = || format!("{type_name}.{}", field.name);
            let v = object
                .get(&field.name)
                .ok_or_else(|| PluginError::format("missing field").with_context(ctx()))?;
            self.field(v, &field.field_type, depth)
                .map_err(|e| e.with_context(ctx()))?;
        }
        Ok(())
    }

    fn field(&mut self, value: &Value, ft: &FieldType, depth: usize) -> Result<(), PluginError> {
        if !ft.is_sequence() && ft.array_len().is_none() {
            return self.element(value, &ft.name, depth);
        }

        let items = value
            .as_array()
            .ok_or_else(|| PluginError::format("expected an array"))?;
        match ft.array_len() {
            Some(len) if items.len() != len => {
                return Err(PluginError::format(format!(
                    "fixed array expects {len} elements, got {}",
                    items.len()
                )));
            }
            Some(_) => {}
            None => {
                let count = u32::try_from(items.len())
                    .map_err(|_| PluginError::format("sequence longer than u32::MAX"))?;
                self.align(4);
                self.body.write_u32::<LittleEndian>(count)?;
            }
        }
        for item in items {
            self.element(item, &ft.name, depth)?;
        }
        Ok(())
    }

    fn element(&mut self, value: &Value, name: &str, depth: usize) -> Result<(), PluginError> {
        match name {
            primitive::BOOL => {
                let b = value
                    .as_bool()
                    .ok_or_else(|| PluginError::format("expected bool"))?;
                self.body.push(u8::from(b));
            }
            primitive::BYTE | primitive::CHAR | primitive::UINT8 => {
                self.body.push(int::<u8>(value)?);
            }
            primitive::INT8 => self.body.write_i8(int(value)?)?,
            primitive::INT16 => {
                self.align(2);
                self.body.write_i16::<LittleEndian>(int(value)?)?;
            }
            primitive::UINT16 => {
                self.align(2);
                self.body.write_u16::<LittleEndian>(int(value)?)?;
            }
            primitive::INT32 => {
                self.align(4);
                self.body.write_i32::<LittleEndian>(int(value)?)?;
            }
            primitive::UINT32 => {
                self.align(4);
                self.body.write_u32::<LittleEndian>(int(value)?)?;
            }
            primitive::INT64 => {
                self.align(8);
                self.body.write_i64::<LittleEndian>(int(value)?)?;
            }
            primitive::UINT64 => {
                self.align(8);
                self.body.write_u64::<LittleEndian>(int(value)?)?;
            }
            primitive::FLOAT32 => {
                self.align(4);
                self.body.write_f32::<LittleEndian>(float(value)? as f32)?;
            }
            primitive::FLOAT64 => {
                self.align(8);
                self.body.write_f64::<LittleEndian>(float(value)?)?;
            }
            primitive::STRING => {
                let s = value
                    .as_str()
                    .ok_or_else(|| PluginError::format("expected string"))?;
                let len = u32::try_from(s.len() + 1)
                    .map_err(|_| PluginError::format("string longer than u32::MAX"))?;
                self.align(4);
                self.body.write_u32::<LittleEndian>(len)?;
                self.body.extend_from_slice(s.as_bytes());
                self.body.push(0);
            }
            nested => self.message(value, nested, depth + 1)?,
        }
        Ok(())
    }

    fn align(&mut self, to: usize) {
        let pad = (to - self.body.len() % to) % to;
        self.body.resize(self.body.len() + pad, 0);
    }
}

/// Integer of the wire width, range-checked.
fn int<T>(value: &Value) -> Result<T, PluginError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let converted = match (value.as_u64(), value.as_i64()) {
        (Some(u), _) => T::try_from(u).ok(),
        (None, Some(i)) => T::try_from(i).ok(),
        (None, None) => {
            return Err(PluginError::format(format!("expected integer, got {value}")));
        }
    };
    converted.ok_or_else(|| PluginError::format(format!("{value} out of range")))
}

/// A number, or one of the `"NaN"`, `"inf"`, `"-inf"` markers.
fn float(value: &Value) -> Result<f64, PluginError> {
    value_to_float(value)
        .ok_or_else(|| PluginError::format(format!("expected number, got {value}")))
}
