//! Error types of the MongoDB storage implementation.

use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// URI as given.
        uri: String,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// Building the client from parsed options failed.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the initial ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Attempts made.
        attempts: u32,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// A health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// Reading the match document failed.
    #[error("failed to load match document `{id}`")]
    LoadDocument {
        /// Document id.
        id: &'static str,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// The `$set` upsert failed.
    #[error("failed to update match document `{id}`")]
    UpdateDocument {
        /// Document id.
        id: &'static str,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// Opening or reading the change stream failed.
    #[error("change stream on match document `{id}` failed")]
    WatchDocument {
        /// Document id.
        id: &'static str,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
}
