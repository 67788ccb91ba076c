/// Declared topic of a bag. `name` is unique within one bag.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TopicMetadata {
    pub name: String,
    /// Wire type, `package/Type` (e.g. `std_msgs/Int32`).
    #[serde(rename = "type")]
    pub type_name: String,
    pub serialization_format: String,
    /// Opaque QoS description recorded alongside the topic.
    #[serde(default)]
    pub offered_qos_profiles: String,
}

impl TopicMetadata {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        serialization_format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            serialization_format: serialization_format.into(),
            offered_qos_profiles: String::new(),
        }
    }
}

/// Topic plus the number of records recorded on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInformation {
    pub topic_metadata: TopicMetadata,
    pub message_count: u64,
}
