use thiserror::Error;

/// Errors that can occur in the reply loop
#[derive(Error, Debug)]
pub enum ReplyError {
    /// Error reading, parsing or validating configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A required secret was not present in the environment
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// The bot could not establish who it is on the platform
    #[error("startup failed: {0}")]
    Startup(String),

    /// Transport-level failure talking to the platform
    #[error("gateway {operation} failed: {source}")]
    Gateway {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered but refused the request
    #[error("gateway {operation} rejected with status {status}: {body}")]
    GatewayRejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The platform answered with something we could not interpret
    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),

    /// Mentions were requested before the bot identity was resolved
    #[error("bot identity has not been resolved")]
    IdentityUnresolved,

    /// The response generator failed
    #[error("response generation failed: {0}")]
    Generation(String),

    /// The response generator produced no text
    #[error("response generator returned an empty reply")]
    EmptyGeneration,

    /// A manual send was given no text
    #[error("refusing to send an empty message")]
    EmptyMessage,
}

impl ReplyError {
    /// Whether this error must stop the process instead of being retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReplyError::ConfigError(_) | ReplyError::MissingCredential(_) | ReplyError::Startup(_)
        )
    }
}

/// Result type alias for reply-loop operations
pub type Result<T> = std::result::Result<T, ReplyError>;
