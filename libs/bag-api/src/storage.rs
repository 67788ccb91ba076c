use std::collections::BTreeMap;

use crate::error::PluginError;
use crate::record::SerializedBagMessage;
use crate::schema::Schema;
use crate::topic::TopicMetadata;

/// Where a bag lives and which record stream backend reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StorageOptions {
    /// Location of the bag (a directory for the `jsonl` backend).
    pub uri: String,
    /// Record stream backend. Empty selects the default backend.
    #[serde(default)]
    pub storage_id: String,
}

impl StorageOptions {
    pub fn new(uri: impl Into<String>, storage_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            storage_id: storage_id.into(),
        }
    }
}

/// Restricts which records a stream yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageFilter {
    /// Topics to yield. Empty means all topics.
    pub topics: Vec<String>,
}

impl StorageFilter {
    pub fn topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, topic_name: &str) -> bool {
        self.topics.is_empty() || self.topics.iter().any(|t| t == topic_name)
    }
}

/// Sequential access to the records of one opened bag.
///
/// The reader doesn't know concrete backends. For the reader, storage is
/// just this trait: records come out in recorded order, once.
pub trait RecordStream: Send {
    /// Backend identifier (`"jsonl"`, `"memory"`).
    fn storage_id(&self) -> &str;

    /// Whether another record (passing the filter) is available.
    ///
    /// Takes `&mut self` so backends can look ahead one record; repeated
    /// calls never skip a record.
    fn has_next(&mut self) -> Result<bool, PluginError>;

    /// Yield the next record. Fails with a `Logic` error when exhausted.
    fn read_next(&mut self) -> Result<SerializedBagMessage, PluginError>;

    /// All topics declared by the bag, in the order the bag declares them.
    fn topics(&self) -> Vec<TopicMetadata>;

    /// Message layouts recorded in the bag, keyed by type name.
    fn message_definitions(&self) -> BTreeMap<String, Schema> {
        BTreeMap::new()
    }

    /// Number of records per topic, if the bag records it.
    fn message_counts(&self) -> Option<BTreeMap<String, u64>> {
        None
    }

    fn set_filter(&mut self, filter: StorageFilter);

    fn reset_filter(&mut self) {
        self.set_filter(StorageFilter::default());
    }
}

/// Opens record streams for one storage id.
///
/// Built-ins: `jsonl` (bag directories) and `memory` (records held by the
/// factory). The reader resolves factories by `StorageOptions::storage_id`.
pub trait StreamFactory: Send + Sync {
    fn open(&self, options: &StorageOptions) -> Result<Box<dyn RecordStream>, PluginError>;
}
