//! Typed values ⇄ serialized bag messages, without a bag.

use std::collections::BTreeMap;
use std::sync::Arc;

use bag_api::format::FormatSerializer;
use bag_api::message::BagMessage;
use bag_api::record::SerializedBagMessage;
use bag_api::topic::TopicMetadata;

use crate::error::ReaderError;
use crate::factory::ConverterFactory;
use crate::registry::TypeRegistry;

/// Format serializer plus the layouts of every type it has seen.
struct Codec {
    format_id: String,
    serializer: Arc<dyn FormatSerializer>,
    types: TypeRegistry,
}

impl Codec {
    fn new(factory: &ConverterFactory, format_id: &str) -> Result<Self, ReaderError> {
        Ok(Self {
            format_id: format_id.to_string(),
            serializer: factory.load_serializer(format_id)?,
            types: TypeRegistry::new(),
        })
    }

    fn learn<T: BagMessage>(&mut self) {
        if self.types.contains(T::TYPE_NAME) {
            return;
        }
        let mut layouts = BTreeMap::new();
        T::collect_schemas(&mut layouts);
        for (name, schema) in layouts {
            self.types.insert_if_absent(name, schema);
        }
    }
}

/// Builds serialized bag messages from typed values.
pub struct Serializer {
    codec: Codec,
}

impl Serializer {
    /// Serializer for a builtin format.
    pub fn new(format_id: &str) -> Result<Self, ReaderError> {
        Self::with_factory(&ConverterFactory::with_builtins(), format_id)
    }

    pub fn with_factory(factory: &ConverterFactory, format_id: &str) -> Result<Self, ReaderError> {
        Ok(Self {
            codec: Codec::new(factory, format_id)?,
        })
    }

    pub fn format_id(&self) -> &str {
        &self.codec.format_id
    }

    /// Topic declaration matching what `serialize::<T>` produces.
    pub fn topic_metadata<T: BagMessage>(&self, topic: &str) -> TopicMetadata {
        TopicMetadata::new(topic, T::TYPE_NAME, self.codec.format_id.clone())
    }

    pub fn serialize<T: BagMessage>(
        &mut self,
        value: &T,
        topic: &str,
        time_stamp: i64,
    ) -> Result<SerializedBagMessage, ReaderError> {
        self.codec.learn::<T>();
        let tree = bag_api::value::to_value(value).map_err(|source| ReaderError::Conversion {
            type_name: T::TYPE_NAME.to_string(),
            source,
        })?;
        let data = self
            .codec
            .serializer
            .serialize(&tree, T::TYPE_NAME, &self.codec.types)
            .map_err(|e| ReaderError::from(e).with_context(format!("topic '{topic}'")))?;
        Ok(SerializedBagMessage::new(topic, data, time_stamp))
    }
}

/// Turns serialized bag messages back into typed values.
pub struct Deserializer {
    codec: Codec,
}

impl Deserializer {
    /// Deserializer for a builtin format.
    pub fn new(format_id: &str) -> Result<Self, ReaderError> {
        Self::with_factory(&ConverterFactory::with_builtins(), format_id)
    }

    pub fn with_factory(factory: &ConverterFactory, format_id: &str) -> Result<Self, ReaderError> {
        Ok(Self {
            codec: Codec::new(factory, format_id)?,
        })
    }

    pub fn format_id(&self) -> &str {
        &self.codec.format_id
    }

    /// Decode `message` as `T`. The topic is not consulted.
    pub fn deserialize<T: BagMessage>(
        &mut self,
        message: &SerializedBagMessage,
    ) -> Result<T, ReaderError> {
        self.codec.learn::<T>();
        let tree = self
            .codec
            .serializer
            .deserialize(&message.serialized_data, T::TYPE_NAME, &self.codec.types)
            .map_err(|e| {
                ReaderError::from(e).with_context(format!("topic '{}'", message.topic_name))
            })?;
        bag_api::value::from_value(tree).map_err(|source| ReaderError::Conversion {
            type_name: T::TYPE_NAME.to_string(),
            source,
        })
    }
}
