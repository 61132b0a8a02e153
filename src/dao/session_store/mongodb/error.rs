use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB backend, each carrying the driver error as source.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is not set.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered during connection.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Attempts made.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// A liveness ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection name.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing a session document failed.
    #[error("failed to save session `{id}`")]
    SaveSession {
        /// Session id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading a session document failed.
    #[error("failed to load session `{id}`")]
    LoadSession {
        /// Session id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing a player document failed.
    #[error("failed to save player `{id}`")]
    SavePlayer {
        /// Player id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Deleting a player document failed.
    #[error("failed to delete player `{id}`")]
    DeletePlayer {
        /// Player id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Listing the players of a session failed.
    #[error("failed to list players of session `{session_id}`")]
    ListPlayers {
        /// Session id.
        session_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored identifier is not a UUID.
    #[error("stored identifier `{value}` is not a valid UUID")]
    InvalidId {
        /// Raw value.
        value: String,
        /// Parse error.
        #[source]
        source: uuid::Error,
    },
}
