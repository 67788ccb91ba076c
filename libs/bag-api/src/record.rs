/// One raw record of a bag, exactly as stored.
/// The reader never interprets `serialized_data` without a format serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedBagMessage {
    /// Topic the record was recorded on.
    pub topic_name: String,
    /// Payload in the topic's serialization format.
    pub serialized_data: Vec<u8>,
    /// Receive time in nanoseconds.
    pub time_stamp: i64,
}

impl SerializedBagMessage {
    pub fn new(topic_name: impl Into<String>, serialized_data: Vec<u8>, time_stamp: i64) -> Self {
        Self {
            topic_name: topic_name.into(),
            serialized_data,
            time_stamp,
        }
    }
}
