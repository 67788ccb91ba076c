use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use bag_api::error::PluginError;
use bag_api::format::{ConverterOptions, FormatSerializer};
use bag_api::message::{BagMessage, IntrospectionMessage};
use bag_api::record::SerializedBagMessage;
use bag_api::storage::{StorageFilter, StorageOptions};
use bag_api::topic::TopicMetadata;

use crate::config::{DEFAULT_STORAGE_ID, default_converter_options};
use crate::error::ReaderError;
use crate::factory::ConverterFactory;
use crate::reader::BaseReader;
use crate::registry::TypeRegistry;
use crate::sequential::{BagInfo, SequentialReader};
use crate::storage::StorageRegistry;

/// Deserializer selected at open, with the format it reads.
struct ActiveFormat {
    format_id: String,
    serializer: Arc<dyn FormatSerializer>,
}

/// Reads a bag record by record and turns records into typed values.
///
/// ```ignore
/// let mut reader = SimpleReader::new();
/// reader.open_path("/bags/run_01")?;
/// while reader.has_next()? {
///     reader.read_next()?;
///     if reader.current_topic() == Some("/odom") {
///         let odom: Odometry = reader.deserialize()?;
///     }
/// }
/// ```
///
/// Not `Sync`: one reader belongs to one thread.
pub struct SimpleReader<R: BaseReader = SequentialReader> {
    reader: R,
    converters: Arc<ConverterFactory>,
    format: Option<ActiveFormat>,
    current_message: Option<Arc<SerializedBagMessage>>,
    /// Topic name → metadata. Built on first lookup, dropped on open/reset.
    topic_index: OnceCell<HashMap<String, TopicMetadata>>,
    /// Types registered by the caller; survive reset.
    registered: TypeRegistry,
    /// `registered` plus layouts recorded in the open bag.
    types: TypeRegistry,
}

impl SimpleReader<SequentialReader> {
    /// Reader over bag storage with the builtin formats.
    pub fn new() -> Self {
        let reader = SequentialReader::new();
        let converters = reader.converters().clone();
        Self::with_reader(reader, converters)
    }

    /// Reader sharing `converters` with its storage reader.
    pub fn with_converters(
        storage: Arc<StorageRegistry>,
        converters: Arc<ConverterFactory>,
    ) -> Self {
        let reader = SequentialReader::with_factories(storage, converters.clone());
        Self::with_reader(reader, converters)
    }

    /// Summary of the open bag. See [`SequentialReader::bag_info`].
    pub fn bag_info(&self) -> Result<BagInfo, ReaderError> {
        self.reader.bag_info()
    }
}

impl Default for SimpleReader<SequentialReader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: BaseReader> SimpleReader<R> {
    pub fn with_reader(reader: R, converters: Arc<ConverterFactory>) -> Self {
        Self {
            reader,
            converters,
            format: None,
            current_message: None,
            topic_index: OnceCell::new(),
            registered: TypeRegistry::new(),
            types: TypeRegistry::new(),
        }
    }

    /// Open the bag at `uri` with the default backend, deserializing CDR.
    pub fn open_path(&mut self, uri: impl Into<String>) -> Result<(), ReaderError> {
        let storage = StorageOptions::new(uri, DEFAULT_STORAGE_ID);
        self.open(&storage, &default_converter_options())
    }

    /// Open a bag, closing the previous one first.
    ///
    /// Records are deserialized with the output format when one is set and
    /// with the input format otherwise. On failure the reader is left closed.
    pub fn open(
        &mut self,
        storage_options: &StorageOptions,
        converter_options: &ConverterOptions,
    ) -> Result<(), ReaderError> {
        self.reset();
        if let Err(e) = self.try_open(storage_options, converter_options) {
            self.reset();
            return Err(e);
        }
        Ok(())
    }

    fn try_open(
        &mut self,
        storage_options: &StorageOptions,
        converter_options: &ConverterOptions,
    ) -> Result<(), ReaderError> {
        let format_id = match (
            converter_options.output_serialization_format.as_str(),
            converter_options.input_serialization_format.as_str(),
        ) {
            ("", "") => {
                return Err(ReaderError::Config(
                    "no serialization format: set input_serialization_format".into(),
                ));
            }
            ("", input) => input.to_string(),
            (output, _) => output.to_string(),
        };
        let serializer = self.converters.load_deserializer(&format_id)?;

        self.reader.open(storage_options, converter_options)?;

        self.types = self.registered.clone();
        for (name, schema) in self.reader.message_definitions()? {
            self.types.insert_if_absent(name, schema);
        }
        self.reader.use_types(&self.types);
        tracing::info!(
            uri = %storage_options.uri,
            format = %format_id,
            types = self.types.len(),
            "reader ready"
        );
        self.format = Some(ActiveFormat {
            format_id,
            serializer,
        });
        Ok(())
    }

    /// Close the bag and forget the current message. Safe when not open.
    pub fn reset(&mut self) {
        let was_open = self.reader.is_open();
        self.reader.reset();
        self.format = None;
        self.current_message = None;
        self.topic_index = OnceCell::new();
        self.types = self.registered.clone();
        if was_open {
            tracing::info!("reader reset");
        }
    }

    pub fn is_open(&self) -> bool {
        self.format.is_some() && self.reader.is_open()
    }

    fn ensure_open(&self) -> Result<(), ReaderError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ReaderError::NotOpen)
        }
    }

    pub fn has_next(&mut self) -> Result<bool, ReaderError> {
        self.ensure_open()?;
        self.reader.has_next()
    }

    /// Advance by one record and make it the current message.
    ///
    /// Past the last record this fails with `Exhausted` and the current
    /// message stays what it was.
    pub fn read_next(&mut self) -> Result<Arc<SerializedBagMessage>, ReaderError> {
        self.ensure_open()?;
        let message = self.reader.read_next()?;
        self.current_message = Some(message.clone());
        Ok(message)
    }

    pub fn current_message(&self) -> Option<&Arc<SerializedBagMessage>> {
        self.current_message.as_ref()
    }

    pub fn current_topic(&self) -> Option<&str> {
        self.current_message.as_deref().map(|m| m.topic_name.as_str())
    }

    /// Topics in the order the bag declares them.
    pub fn get_all_topics_and_types(&self) -> Result<Vec<TopicMetadata>, ReaderError> {
        self.ensure_open()?;
        self.reader.get_all_topics_and_types()
    }

    /// Wire type of `topic`, or `""` when the topic is unknown or no bag is open.
    pub fn topic_type(&self, topic: &str) -> String {
        self.topic_metadata(topic)
            .map(|t| t.type_name.clone())
            .unwrap_or_default()
    }

    /// Metadata of `topic` as reads hand it out, or `None` when the topic is
    /// unknown or no bag is open.
    pub fn topic_metadata(&self, topic: &str) -> Option<&TopicMetadata> {
        if let Some(index) = self.topic_index.get() {
            return index.get(topic);
        }
        if !self.is_open() {
            return None;
        }
        let topics = match self.reader.get_all_topics_and_types() {
            Ok(topics) => topics,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list topics");
                return None;
            }
        };
        let index = self
            .topic_index
            .get_or_init(|| topics.into_iter().map(|t| (t.name.clone(), t)).collect());
        index.get(topic)
    }

    /// Restrict subsequent reads to `filter`'s topics.
    pub fn set_filter(&mut self, filter: StorageFilter) -> Result<(), ReaderError> {
        self.ensure_open()?;
        self.reader.set_filter(filter)
    }

    pub fn reset_filter(&mut self) -> Result<(), ReaderError> {
        self.ensure_open()?;
        self.reader.reset_filter()
    }

    /// Bind `T` (and the message types nested in it) to its layout.
    /// Registered layouts take precedence over layouts recorded in bags.
    pub fn register<T: BagMessage>(&mut self) {
        self.registered.register::<T>();
        self.types.register::<T>();
        self.reader.use_types(&self.types);
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // ── Deserialization ──

    /// Decode the current message into its introspectable form.
    pub fn deserialize_message(&self) -> Result<IntrospectionMessage, ReaderError> {
        self.ensure_open()?;
        let message = self
            .current_message
            .as_ref()
            .ok_or(ReaderError::NoCurrentMessage)?;
        let topic = self
            .topic_metadata(&message.topic_name)
            .ok_or_else(|| ReaderError::UnknownTopic(message.topic_name.clone()))?;
        let format = self.format.as_ref().ok_or(ReaderError::NotOpen)?;

        if !topic.serialization_format.is_empty()
            && topic.serialization_format != format.format_id
        {
            return Err(ReaderError::Config(format!(
                "topic '{}' is serialized as '{}', reader deserializes '{}'",
                topic.name, topic.serialization_format, format.format_id
            )));
        }

        let missing = self.types.missing_dependencies(&topic.type_name);
        if !missing.is_empty() {
            let unknown: Vec<String> =
                missing.iter().map(|t| format!("unknown type '{t}'")).collect();
            return Err(ReaderError::from(PluginError::schema(unknown.join(", ")))
                .with_context(format!("topic '{}'", topic.name)));
        }

        let data = format
            .serializer
            .deserialize(&message.serialized_data, &topic.type_name, &self.types)
            .map_err(|e| ReaderError::from(e).with_context(format!("topic '{}'", topic.name)))?;
        tracing::debug!(topic = %topic.name, type_name = %topic.type_name, "deserialized record");

        Ok(IntrospectionMessage {
            topic_name: message.topic_name.clone(),
            type_name: topic.type_name.clone(),
            time_stamp: message.time_stamp,
            data,
        })
    }

    /// Decode the current message as `T`.
    ///
    /// Fails with `TypeMismatch` unless the topic carries `T::TYPE_NAME`.
    /// `T`'s layout is used unless the bag already records one.
    pub fn deserialize<T: BagMessage>(&mut self) -> Result<T, ReaderError> {
        self.ensure_open()?;
        let message = self
            .current_message
            .as_ref()
            .ok_or(ReaderError::NoCurrentMessage)?;
        let actual = self.topic_type(&message.topic_name);
        if actual.is_empty() {
            return Err(ReaderError::UnknownTopic(message.topic_name.clone()));
        }
        if actual != T::TYPE_NAME {
            return Err(ReaderError::TypeMismatch {
                topic: message.topic_name.clone(),
                expected: T::TYPE_NAME.to_string(),
                actual,
            });
        }

        let mut layouts = BTreeMap::new();
        T::collect_schemas(&mut layouts);
        let mut learned = false;
        for (name, schema) in layouts {
            learned |= self.types.insert_if_absent(name, schema);
        }
        if learned {
            self.reader.use_types(&self.types);
        }

        let value = self.deserialize_message()?;
        bag_api::value::from_value(value.data).map_err(|source| ReaderError::Conversion {
            type_name: T::TYPE_NAME.to_string(),
            source,
        })
    }

    /// Decode the current message as `T` without checking the topic's type.
    ///
    /// The conversion is structural: it succeeds whenever the decoded fields
    /// fit `T`, and fails with `Conversion` otherwise.
    pub fn deserialize_unchecked<T: DeserializeOwned>(&self) -> Result<T, ReaderError> {
        let value = self.deserialize_message()?;
        bag_api::value::from_value(value.data).map_err(|source| ReaderError::Conversion {
            type_name: std::any::type_name::<T>().to_string(),
            source,
        })
    }
}

impl<R: BaseReader> Drop for SimpleReader<R> {
    fn drop(&mut self) {
        self.reset();
    }
}
