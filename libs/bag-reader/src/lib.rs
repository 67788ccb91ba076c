//! Sequential bag reading: record streams, format conversion and typed
//! access to recorded messages.

pub mod config;
pub mod error;
pub mod factory;
pub mod plugin_host;
pub mod reader;
pub mod registry;
pub mod sequential;
pub mod serialization;
pub mod simple;
pub mod storage;

pub use error::ReaderError;
pub use factory::ConverterFactory;
pub use reader::BaseReader;
pub use sequential::{BagInfo, SequentialReader};
pub use serialization::{Deserializer, Serializer};
pub use simple::SimpleReader;
