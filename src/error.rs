//! Error types for the lead pipeline.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Lead store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound transport and inbound mailbox errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to fetch messages on channel {name}: {reason}")]
    FetchFailed { name: String, reason: String },
}

/// Address-validation infrastructure errors (never a negative verdict).
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("DNS resolver setup failed: {0}")]
    ResolverSetup(String),

    #[error("MX lookup for {domain} failed: {reason}")]
    MxLookup { domain: String, reason: String },
}

/// Per-lead and loop-level pipeline failures.
///
/// The `Display` output of `Verification` and `Outreach` is what gets written
/// into the lead's notes column.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Outreach failed: {0}")]
    Outreach(String),

    #[error("Lead discovery failed: {0}")]
    Discovery(String),

    #[error("Inbound poll failed: {0}")]
    Poll(String),

    #[error("Inbound task failed: {0}")]
    InboundTask(String),

    #[error("Report failed: {0}")]
    Report(String),
}
