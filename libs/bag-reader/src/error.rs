use bag_api::error::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("config error: {0}")]
    Config(String),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reader is not open")]
    NotOpen,

    #[error("no more records in the bag")]
    Exhausted,

    #[error("no current message: read_next() has not been called since open")]
    NoCurrentMessage,

    #[error("topic '{0}' is not declared in the bag")]
    UnknownTopic(String),

    #[error("topic '{topic}' carries '{actual}', requested type is '{expected}'")]
    TypeMismatch {
        topic: String,
        expected: String,
        actual: String,
    },

    #[error("cannot convert message to '{type_name}': {source}")]
    Conversion {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ReaderError {
    /// Add context to the error.
    ///
    /// For `Plugin` variant, context is added to the inner `PluginError`.
    /// For `Config`, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            ReaderError::Plugin(e) => ReaderError::Plugin(e.with_context(ctx)),
            ReaderError::Config(msg) => ReaderError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
