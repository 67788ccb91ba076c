use std::collections::BTreeMap;
use std::sync::Arc;

use bag_api::format::ConverterOptions;
use bag_api::record::SerializedBagMessage;
use bag_api::schema::Schema;
use bag_api::storage::{StorageFilter, StorageOptions};
use bag_api::topic::TopicMetadata;

use crate::error::ReaderError;
use crate::registry::TypeRegistry;

/// Raw, sequential access to one bag.
///
/// Every method except `open` and `reset` fails with `NotOpen` while no
/// bag is open. `read_next` fails with `Exhausted` past the last record.
pub trait BaseReader {
    /// Open a bag, closing the previous one first.
    fn open(
        &mut self,
        storage_options: &StorageOptions,
        converter_options: &ConverterOptions,
    ) -> Result<(), ReaderError>;

    /// Close the bag. No-op when nothing is open.
    fn reset(&mut self);

    fn is_open(&self) -> bool;

    fn has_next(&mut self) -> Result<bool, ReaderError>;

    fn read_next(&mut self) -> Result<Arc<SerializedBagMessage>, ReaderError>;

    /// Topics with the serialization format their records are handed out in.
    fn get_all_topics_and_types(&self) -> Result<Vec<TopicMetadata>, ReaderError>;

    /// Message layouts recorded in the bag.
    fn message_definitions(&self) -> Result<BTreeMap<String, Schema>, ReaderError>;

    fn set_filter(&mut self, filter: StorageFilter) -> Result<(), ReaderError>;

    /// Layouts the caller resolved for the open bag. Readers that decode
    /// payloads themselves prefer these over the recorded ones; the rest
    /// ignore them.
    fn use_types(&mut self, _types: &TypeRegistry) {}

    fn reset_filter(&mut self) -> Result<(), ReaderError> {
        self.set_filter(StorageFilter::default())
    }
}
