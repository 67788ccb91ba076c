use std::collections::{BTreeMap, HashMap};

/// Primitive wire type names understood by every schema-driven format.
pub mod primitive {
    pub const BOOL: &str = "bool";
    pub const BYTE: &str = "byte";
    pub const CHAR: &str = "char";
    pub const INT8: &str = "int8";
    pub const UINT8: &str = "uint8";
    pub const INT16: &str = "int16";
    pub const UINT16: &str = "uint16";
    pub const INT32: &str = "int32";
    pub const UINT32: &str = "uint32";
    pub const INT64: &str = "int64";
    pub const UINT64: &str = "uint64";
    pub const FLOAT32: &str = "float32";
    pub const FLOAT64: &str = "float64";
    pub const STRING: &str = "string";

    pub const ALL: [&str; 14] = [
        BOOL, BYTE, CHAR, INT8, UINT8, INT16, UINT16, INT32, UINT32, INT64, UINT64, FLOAT32,
        FLOAT64, STRING,
    ];
}

/// Attribute marking an unbounded sequence (`attrs.sequence = true`).
pub const ATTR_SEQUENCE: &str = "sequence";
/// Attribute marking a fixed-size array (`attrs.array = N`).
pub const ATTR_ARRAY: &str = "array";

pub fn is_primitive(type_name: &str) -> bool {
    primitive::ALL.contains(&type_name)
}

/// Element type of a field.
///
/// `name` is either a primitive (see [`primitive`]) or a nested message
/// type name (`package/Type`). Collections are expressed through attrs:
///
/// - `{ name: "int32", attrs: { sequence: true } }`: `int32[]`
/// - `{ name: "geometry/Point", attrs: { array: 3 } }`: `geometry/Point[3]`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldType {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl FieldType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn sequence(name: impl Into<String>) -> Self {
        let mut ft = Self::new(name);
        ft.attrs.insert(ATTR_SEQUENCE.into(), serde_json::Value::Bool(true));
        ft
    }

    pub fn array(name: impl Into<String>, len: usize) -> Self {
        let mut ft = Self::new(name);
        ft.attrs.insert(ATTR_ARRAY.into(), serde_json::Value::from(len));
        ft
    }

    pub fn is_sequence(&self) -> bool {
        self.attrs
            .get(ATTR_SEQUENCE)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn array_len(&self) -> Option<usize> {
        self.attrs
            .get(ATTR_ARRAY)
            .and_then(serde_json::Value::as_u64)
            .map(|n| n as usize)
    }

    pub fn is_primitive(&self) -> bool {
        is_primitive(&self.name)
    }
}

/// A single named field of a message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Memory-independent layout of one message type.
///
/// Field order is wire order for positional formats (CDR).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Nested message type names referenced by this schema, in field order.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| !f.field_type.is_primitive())
            .map(|f| f.field_type.name.as_str())
    }
}

/// Lookup of message layouts by wire type name.
///
/// Schema-driven formats call this for the top-level type and for every
/// nested type they encounter.
pub trait SchemaResolver {
    fn resolve(&self, type_name: &str) -> Option<&Schema>;
}

impl SchemaResolver for HashMap<String, Schema> {
    fn resolve(&self, type_name: &str) -> Option<&Schema> {
        self.get(type_name)
    }
}

impl SchemaResolver for BTreeMap<String, Schema> {
    fn resolve(&self, type_name: &str) -> Option<&Schema> {
        self.get(type_name)
    }
}
