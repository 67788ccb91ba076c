use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bag_api::format::{ConverterOptions, FormatSerializer};
use bag_api::record::SerializedBagMessage;
use bag_api::schema::Schema;
use bag_api::storage::{RecordStream, StorageFilter, StorageOptions};
use bag_api::topic::{TopicInformation, TopicMetadata};

use crate::error::ReaderError;
use crate::factory::ConverterFactory;
use crate::reader::BaseReader;
use crate::registry::TypeRegistry;
use crate::storage::StorageRegistry;

/// Summary of an open bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagInfo {
    pub uri: String,
    pub storage_id: String,
    /// Topics as recorded, in declaration order.
    pub topics: Vec<TopicInformation>,
    /// `None` when the backend cannot count records.
    pub message_count: Option<u64>,
}

/// Re-encodes payloads of one topic on read.
struct Conversion {
    type_name: String,
    from: Arc<dyn FormatSerializer>,
    to: Arc<dyn FormatSerializer>,
}

struct OpenBag {
    uri: String,
    stream: Box<dyn RecordStream>,
    topics: Vec<TopicMetadata>,
    output_format: String,
    /// Keyed by topic name; topics already in the output format are absent.
    conversions: HashMap<String, Conversion>,
    recorded: BTreeMap<String, Schema>,
    /// Layouts conversions decode and encode with.
    types: TypeRegistry,
}

/// Storage-backed [`BaseReader`].
///
/// With a non-empty `output_serialization_format`, records of topics
/// recorded in another format are converted before they are handed out.
pub struct SequentialReader {
    storage: Arc<StorageRegistry>,
    converters: Arc<ConverterFactory>,
    bag: Option<OpenBag>,
}

impl SequentialReader {
    pub fn new() -> Self {
        Self::with_factories(
            Arc::new(StorageRegistry::with_builtins()),
            Arc::new(ConverterFactory::with_builtins()),
        )
    }

    pub fn with_factories(
        storage: Arc<StorageRegistry>,
        converters: Arc<ConverterFactory>,
    ) -> Self {
        Self {
            storage,
            converters,
            bag: None,
        }
    }

    pub fn converters(&self) -> &Arc<ConverterFactory> {
        &self.converters
    }

    fn bag(&self) -> Result<&OpenBag, ReaderError> {
        self.bag.as_ref().ok_or(ReaderError::NotOpen)
    }

    fn bag_mut(&mut self) -> Result<&mut OpenBag, ReaderError> {
        self.bag.as_mut().ok_or(ReaderError::NotOpen)
    }

    /// Topics with per-topic record counts, as recorded.
    pub fn bag_info(&self) -> Result<BagInfo, ReaderError> {
        let bag = self.bag()?;
        let counts = bag.stream.message_counts();
        let topics = bag
            .topics
            .iter()
            .map(|t| TopicInformation {
                topic_metadata: t.clone(),
                message_count: counts
                    .as_ref()
                    .and_then(|c| c.get(&t.name).copied())
                    .unwrap_or(0),
            })
            .collect();
        Ok(BagInfo {
            uri: bag.uri.clone(),
            storage_id: bag.stream.storage_id().to_string(),
            topics,
            message_count: counts.map(|c| c.values().sum()),
        })
    }

    /// Topics recorded without a format are taken to be in the input format.
    fn plan_conversions(
        &self,
        topics: &[TopicMetadata],
        converter_options: &ConverterOptions,
    ) -> Result<HashMap<String, Conversion>, ReaderError> {
        let mut conversions = HashMap::new();
        let output_format = converter_options.output_serialization_format.as_str();
        if output_format.is_empty() {
            return Ok(conversions);
        }
        for topic in topics {
            let recorded_format = match topic.serialization_format.as_str() {
                "" => converter_options.input_serialization_format.as_str(),
                format => format,
            };
            if recorded_format == output_format {
                continue;
            }
            let ctx = format!("topic '{}'", topic.name);
            let from = self
                .converters
                .load_deserializer(recorded_format)
                .map_err(|e| e.with_context(&ctx))?;
            let to = self
                .converters
                .load_serializer(output_format)
                .map_err(|e| e.with_context(&ctx))?;
            tracing::debug!(
                topic = %topic.name,
                from = %recorded_format,
                to = %output_format,
                "converting topic on read"
            );
            conversions.insert(
                topic.name.clone(),
                Conversion {
                    type_name: topic.type_name.clone(),
                    from,
                    to,
                },
            );
        }
        Ok(conversions)
    }
}

impl Default for SequentialReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseReader for SequentialReader {
    fn open(
        &mut self,
        storage_options: &StorageOptions,
        converter_options: &ConverterOptions,
    ) -> Result<(), ReaderError> {
        self.reset();

        let stream = self.storage.open(storage_options)?;
        let topics = stream.topics();
        let output_format = converter_options.output_serialization_format.clone();
        let conversions = self.plan_conversions(&topics, converter_options)?;

        let recorded = stream.message_definitions();
        let mut types = TypeRegistry::new();
        for (name, schema) in &recorded {
            types.insert_if_absent(name.clone(), schema.clone());
        }

        tracing::info!(
            uri = %storage_options.uri,
            storage_id = stream.storage_id(),
            topics = topics.len(),
            converted_topics = conversions.len(),
            "opened bag"
        );
        self.bag = Some(OpenBag {
            uri: storage_options.uri.clone(),
            stream,
            topics,
            output_format,
            conversions,
            recorded,
            types,
        });
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(bag) = self.bag.take() {
            tracing::debug!(uri = %bag.uri, "closed bag");
        }
    }

    fn is_open(&self) -> bool {
        self.bag.is_some()
    }

    fn has_next(&mut self) -> Result<bool, ReaderError> {
        Ok(self.bag_mut()?.stream.has_next()?)
    }

    fn read_next(&mut self) -> Result<Arc<SerializedBagMessage>, ReaderError> {
        let bag = self.bag_mut()?;
        if !bag.stream.has_next()? {
            return Err(ReaderError::Exhausted);
        }
        let mut message = bag.stream.read_next()?;

        if let Some(conv) = bag.conversions.get(&message.topic_name) {
            let value = conv
                .from
                .deserialize(&message.serialized_data, &conv.type_name, &bag.types)
                .and_then(|v| conv.to.serialize(&v, &conv.type_name, &bag.types))
                .map_err(|e| {
                    ReaderError::from(e).with_context(format!(
                        "converting record on topic '{}' to '{}'",
                        message.topic_name, bag.output_format
                    ))
                })?;
            message.serialized_data = value;
        }

        tracing::debug!(
            topic = %message.topic_name,
            time_stamp = message.time_stamp,
            bytes = message.serialized_data.len(),
            "read record"
        );
        Ok(Arc::new(message))
    }

    fn get_all_topics_and_types(&self) -> Result<Vec<TopicMetadata>, ReaderError> {
        let bag = self.bag()?;
        Ok(bag
            .topics
            .iter()
            .map(|t| {
                let mut t = t.clone();
                if bag.conversions.contains_key(&t.name) {
                    t.serialization_format = bag.output_format.clone();
                }
                t
            })
            .collect())
    }

    fn message_definitions(&self) -> Result<BTreeMap<String, Schema>, ReaderError> {
        Ok(self.bag()?.recorded.clone())
    }

    fn set_filter(&mut self, filter: StorageFilter) -> Result<(), ReaderError> {
        self.bag_mut()?.stream.set_filter(filter);
        Ok(())
    }

    /// Conversions use `types`; recorded layouts only fill what it lacks.
    fn use_types(&mut self, types: &TypeRegistry) {
        let Some(bag) = self.bag.as_mut() else {
            return;
        };
        let mut merged = types.clone();
        for (name, schema) in &bag.recorded {
            if !merged.contains(name) {
                merged.insert_if_absent(name.clone(), schema.clone());
            }
        }
        bag.types = merged;
    }
}

#[cfg(test)]
mod tests {
    use bag_api::schema::{Field, FieldType, primitive};
    use serde_json::json;

    use super::*;
    use crate::storage::{MemoryBag, STORAGE_MEMORY};

    fn int32_schema() -> Schema {
        Schema::new(vec![Field::new("data", FieldType::new(primitive::INT32))])
    }

    fn reader_over(bag: MemoryBag) -> SequentialReader {
        SequentialReader::with_factories(
            Arc::new(StorageRegistry::with_memory(bag)),
            Arc::new(ConverterFactory::with_builtins()),
        )
    }

    fn memory() -> StorageOptions {
        StorageOptions::new("", STORAGE_MEMORY)
    }

    #[test]
    fn not_open() {
        let mut reader = SequentialReader::new();
        assert!(matches!(reader.has_next(), Err(ReaderError::NotOpen)));
        assert!(matches!(reader.read_next(), Err(ReaderError::NotOpen)));
        assert!(matches!(reader.get_all_topics_and_types(), Err(ReaderError::NotOpen)));
        assert!(matches!(reader.bag_info(), Err(ReaderError::NotOpen)));
        reader.reset();
    }

    #[test]
    fn converts_json_records_to_cdr() {
        let bag = MemoryBag::new()
            .with_topic(TopicMetadata::new("/n", "std_msgs/Int32", "json"))
            .with_schema("std_msgs/Int32", int32_schema())
            .with_message(SerializedBagMessage::new("/n", br#"{"data":-2}"#.to_vec(), 5));
        let mut reader = reader_over(bag);
        reader.open(&memory(), &ConverterOptions::new("cdr", "cdr")).unwrap();

        let topics = reader.get_all_topics_and_types().unwrap();
        assert_eq!(topics[0].serialization_format, "cdr");

        let record = reader.read_next().unwrap();
        assert_eq!(record.serialized_data, [0, 1, 0, 0, 0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(record.time_stamp, 5);
        assert!(matches!(reader.read_next(), Err(ReaderError::Exhausted)));
    }

    #[test]
    fn conversion_without_layout_names_the_topic() {
        let bag = MemoryBag::new()
            .with_topic(TopicMetadata::new("/n", "std_msgs/Int32", "json"))
            .with_message(SerializedBagMessage::new("/n", br#"{"data":1}"#.to_vec(), 5));
        let mut reader = reader_over(bag);
        reader.open(&memory(), &ConverterOptions::new("cdr", "cdr")).unwrap();

        let err = reader.read_next().unwrap_err();
        assert!(err.to_string().contains("topic '/n'"));
        assert!(err.to_string().contains("unknown type 'std_msgs/Int32'"));
    }

    #[test]
    fn caller_layouts_drive_conversion() {
        let int16 = Schema::new(vec![Field::new("data", FieldType::new(primitive::INT16))]);
        let bag = MemoryBag::new()
            .with_topic(TopicMetadata::new("/n", "std_msgs/Int32", "json"))
            .with_schema("std_msgs/Int32", int16)
            .with_message(SerializedBagMessage::new("/n", br#"{"data":-2}"#.to_vec(), 5));
        let mut reader = reader_over(bag);
        reader.open(&memory(), &ConverterOptions::new("json", "cdr")).unwrap();

        let mut types = TypeRegistry::new();
        types.insert_if_absent("std_msgs/Int32", int32_schema());
        reader.use_types(&types);

        let record = reader.read_next().unwrap();
        assert_eq!(record.serialized_data, [0, 1, 0, 0, 0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(reader.message_definitions().unwrap()["std_msgs/Int32"].fields.len(), 1);
    }

    #[test]
    fn topic_without_format_is_in_the_input_format() {
        let bag = MemoryBag::new()
            .with_topic(TopicMetadata::new("/n", "std_msgs/Int32", ""))
            .with_schema("std_msgs/Int32", int32_schema())
            .with_message(SerializedBagMessage::new("/n", br#"{"data":-2}"#.to_vec(), 5));

        let mut reader = reader_over(bag.clone());
        reader.open(&memory(), &ConverterOptions::new("json", "cdr")).unwrap();
        assert_eq!(reader.get_all_topics_and_types().unwrap()[0].serialization_format, "cdr");
        assert_eq!(reader.read_next().unwrap().serialized_data.len(), 8);

        let mut reader = reader_over(bag);
        reader.open(&memory(), &ConverterOptions::new("cdr", "cdr")).unwrap();
        assert_eq!(reader.get_all_topics_and_types().unwrap()[0].serialization_format, "");
    }

    #[test]
    fn no_output_format_keeps_records_as_recorded() {
        let payload = json!({ "data": 1 }).to_string().into_bytes();
        let bag = MemoryBag::new()
            .with_topic(TopicMetadata::new("/n", "std_msgs/Int32", "json"))
            .with_message(SerializedBagMessage::new("/n", payload.clone(), 1));
        let mut reader = reader_over(bag);
        reader.open(&memory(), &ConverterOptions::new("json", "")).unwrap();

        assert_eq!(reader.get_all_topics_and_types().unwrap()[0].serialization_format, "json");
        assert_eq!(reader.read_next().unwrap().serialized_data, payload);
    }

    #[test]
    fn unknown_recorded_format_fails_open_when_converting() {
        let bag = MemoryBag::new().with_topic(TopicMetadata::new("/n", "std_msgs/Int32", "rosmsg"));
        let mut reader = reader_over(bag);
        let err = reader
            .open(&memory(), &ConverterOptions::new("cdr", "cdr"))
            .unwrap_err();
        assert!(err.to_string().contains("topic '/n'"));
        assert!(!reader.is_open());
    }

    #[test]
    fn bag_info_counts_per_topic() {
        let bag = MemoryBag::new()
            .with_topic(TopicMetadata::new("/a", "std_msgs/Int32", "cdr"))
            .with_topic(TopicMetadata::new("/b", "std_msgs/Int32", "cdr"))
            .with_messages([
                SerializedBagMessage::new("/a", vec![], 1),
                SerializedBagMessage::new("/a", vec![], 2),
            ]);
        let mut reader = reader_over(bag);
        reader.open(&memory(), &ConverterOptions::default()).unwrap();

        let info = reader.bag_info().unwrap();
        assert_eq!(info.storage_id, "memory");
        assert_eq!(info.message_count, Some(2));
        assert_eq!(info.topics[0].message_count, 2);
        assert_eq!(info.topics[1].message_count, 0);
    }
}
