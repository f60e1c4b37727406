use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    /// Initial connect or reconnect failed. Fatal to the calling operation.
    #[error("Connection to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<GraphError>,
    },

    /// The client reports the network connection as unusable.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Failed to begin transaction: {0}")]
    TransactionBegin(#[source] Box<GraphError>),

    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] Box<GraphError>),

    /// Rollback failed after the unit of work failed. Both errors are kept.
    #[error("Failed to roll back transaction: {source} (rollback triggered by: {cause})")]
    Rollback {
        #[source]
        source: Box<GraphError>,
        cause: Box<GraphError>,
    },

    #[error("Decoding error{}: {reason}", display_path(.path))]
    Decode { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Client error: {0}")]
    Client(String),
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at '{}'", path)
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    pub fn connection(url: impl Into<String>, source: GraphError) -> Self {
        Self::Connection {
            url: url.into(),
            source: Box::new(source),
        }
    }

    pub fn begin(source: GraphError) -> Self {
        Self::TransactionBegin(Box::new(source))
    }

    pub fn commit(source: GraphError) -> Self {
        Self::Commit(Box::new(source))
    }

    pub fn rollback(source: GraphError, cause: GraphError) -> Self {
        Self::Rollback {
            source: Box::new(source),
            cause: Box::new(cause),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            path: String::new(),
            reason: reason.into(),
        }
    }

    /// Prefixes the decoding path with `field`, so nested failures read `outer.inner`.
    pub fn at_field(self, field: &str) -> Self {
        match self {
            Self::Decode { path, reason } => {
                let path = if path.is_empty() {
                    field.to_string()
                } else {
                    format!("{}.{}", field, path)
                };
                Self::Decode { path, reason }
            }
            other => other,
        }
    }

    /// Whether this failure means the connection to the database is unusable.
    ///
    /// Looks through the transaction wrappers: a commit that failed because the
    /// socket died is still a connectivity failure. `Connection` is never
    /// connectivity-class, a failed reconnect is final.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Connectivity(_) => true,
            Self::TransactionBegin(inner) | Self::Commit(inner) => inner.is_connectivity(),
            Self::Rollback { source, cause } => {
                source.is_connectivity() || cause.is_connectivity()
            }
            _ => false,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}
