use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::schema::Schema;

/// Type-erased, introspectable form of one deserialized record.
///
/// Produced fresh by every deserialize call. `data` is a value tree whose
/// shape follows the schema of `type_name`: messages are objects keyed by
/// field name, sequences and arrays are arrays, primitives are scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrospectionMessage {
    pub topic_name: String,
    pub type_name: String,
    pub time_stamp: i64,
    pub data: serde_json::Value,
}

/// A Rust type bound to a wire type name and a message layout.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(BagMessage, Serialize, Deserialize)]
/// #[bag(type_name = "geometry/Point")]
/// pub struct Point { pub x: f64, pub y: f64, pub z: f64 }
/// ```
///
/// Field names of the serde representation must equal the schema field
/// names, so `#[serde(rename)]` on message fields is not supported.
pub trait BagMessage: Serialize + DeserializeOwned {
    /// Wire type name, `package/Type`.
    const TYPE_NAME: &'static str;

    fn schema() -> Schema;

    /// Insert this type's schema and the schemas of all nested message types.
    fn collect_schemas(out: &mut BTreeMap<String, Schema>) {
        if out.contains_key(Self::TYPE_NAME) {
            return;
        }
        out.insert(Self::TYPE_NAME.to_string(), Self::schema());
        Self::collect_dependencies(out);
    }

    /// Called by `collect_schemas` for nested message types. Leaf types keep the default.
    fn collect_dependencies(_out: &mut BTreeMap<String, Schema>) {}
}
