use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bag_api::error::PluginError;
use bag_api::message::BagMessage;
use bag_api::record::SerializedBagMessage;
use bag_api::schema::Schema;
use bag_api::storage::{RecordStream, StorageFilter, StorageOptions, StreamFactory};
use bag_api::topic::TopicMetadata;

use super::STORAGE_MEMORY;

// ═══════════════════════════════════════════════════════════════
//  MemoryBag
// ═══════════════════════════════════════════════════════════════

/// A bag assembled in code. Every `open` yields an independent stream over
/// the same records, so it behaves like a bag on disk that is reopened.
#[derive(Debug, Clone, Default)]
pub struct MemoryBag {
    topics: Vec<TopicMetadata>,
    messages: Arc<Vec<SerializedBagMessage>>,
    definitions: BTreeMap<String, Schema>,
}

impl MemoryBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, topic: TopicMetadata) -> Self {
        self.topics.push(topic);
        self
    }

    pub fn with_message(mut self, message: SerializedBagMessage) -> Self {
        Arc::make_mut(&mut self.messages).push(message);
        self
    }

    pub fn with_messages(
        mut self,
        messages: impl IntoIterator<Item = SerializedBagMessage>,
    ) -> Self {
        Arc::make_mut(&mut self.messages).extend(messages);
        self
    }

    /// Record the layout of `T` and its nested types in the bag.
    pub fn with_definition<T: BagMessage>(mut self) -> Self {
        T::collect_schemas(&mut self.definitions);
        self
    }

    /// Record a layout by name, for types without a Rust counterpart.
    pub fn with_schema(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.definitions.insert(type_name.into(), schema);
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Open a stream directly, without going through storage options.
    pub fn stream(&self) -> Result<MemoryStream, PluginError> {
        let declared: HashSet<&str> = self.topics.iter().map(|t| t.name.as_str()).collect();
        if declared.len() != self.topics.len() {
            return Err(PluginError::schema("memory bag declares a topic twice"));
        }
        if let Some(m) = self
            .messages
            .iter()
            .find(|m| !declared.contains(m.topic_name.as_str()))
        {
            return Err(PluginError::schema(format!(
                "record on undeclared topic '{}'",
                m.topic_name
            )));
        }
        Ok(MemoryStream {
            bag: self.clone(),
            cursor: 0,
            filter: StorageFilter::default(),
        })
    }
}

impl StreamFactory for MemoryBag {
    fn open(&self, _options: &StorageOptions) -> Result<Box<dyn RecordStream>, PluginError> {
        Ok(Box::new(self.stream()?))
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStream
// ═══════════════════════════════════════════════════════════════

pub struct MemoryStream {
    bag: MemoryBag,
    cursor: usize,
    filter: StorageFilter,
}

impl MemoryStream {
    /// Index of the next record the filter accepts; the cursor stays put.
    fn next_accepted(&self) -> Option<usize> {
        self.bag.messages[self.cursor.min(self.bag.messages.len())..]
            .iter()
            .position(|m| self.filter.accepts(&m.topic_name))
            .map(|offset| self.cursor + offset)
    }

    /// Start over from the first record.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl RecordStream for MemoryStream {
    fn storage_id(&self) -> &str {
        STORAGE_MEMORY
    }

    fn has_next(&mut self) -> Result<bool, PluginError> {
        Ok(self.next_accepted().is_some())
    }

    fn read_next(&mut self) -> Result<SerializedBagMessage, PluginError> {
        let at = self
            .next_accepted()
            .ok_or_else(|| PluginError::logic("no more records in memory bag"))?;
        self.cursor = at + 1;
        Ok(self.bag.messages[at].clone())
    }

    fn topics(&self) -> Vec<TopicMetadata> {
        self.bag.topics.clone()
    }

    fn message_definitions(&self) -> BTreeMap<String, Schema> {
        self.bag.definitions.clone()
    }

    fn message_counts(&self) -> Option<BTreeMap<String, u64>> {
        let mut counts: BTreeMap<String, u64> =
            self.bag.topics.iter().map(|t| (t.name.clone(), 0)).collect();
        for m in self.bag.messages.iter() {
            *counts.entry(m.topic_name.clone()).or_default() += 1;
        }
        Some(counts)
    }

    fn set_filter(&mut self, filter: StorageFilter) {
        self.filter = filter;
    }
}
