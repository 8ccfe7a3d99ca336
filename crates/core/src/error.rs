use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Classification of a database fault, decided by the adapter from the driver's
/// error code at the point the fault is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The connect string / TNS alias could not be resolved.
    ConnectIdentifier,
    /// Bad username or password.
    Authentication,
    /// The native client library could not be loaded.
    ClientLibrary,
    /// Listener unreachable, connection reset, timeouts.
    Network,
    /// A table or column named in the statement does not exist.
    MissingObject,
    InsufficientPrivileges,
    Other,
}

impl DbErrorKind {
    /// Operator-facing advice for this kind of failure.
    pub fn hint(&self) -> &'static str {
        match self {
            DbErrorKind::ConnectIdentifier => {
                "check DB_CONNECT_STRING (host:port/service or a resolvable TNS alias)"
            }
            DbErrorKind::Authentication => "check DB_USER and DB_PASSWORD",
            DbErrorKind::ClientLibrary => {
                "Oracle Instant Client was not found; check the library path and restart the shell"
            }
            DbErrorKind::Network => "the database host is unreachable; check network and listener",
            DbErrorKind::MissingObject => "check that the table and column names exist",
            DbErrorKind::InsufficientPrivileges => "the database user lacks SELECT permission",
            DbErrorKind::Other => "check the database connection details",
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbErrorKind::ConnectIdentifier => "connect identifier",
            DbErrorKind::Authentication => "authentication",
            DbErrorKind::ClientLibrary => "client library",
            DbErrorKind::Network => "network",
            DbErrorKind::MissingObject => "missing object",
            DbErrorKind::InsufficientPrivileges => "insufficient privileges",
            DbErrorKind::Other => "database",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} error{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Database {
        kind: DbErrorKind,
        code: Option<i32>,
        message: String,
    },

    #[error("database not initialized; call initialize() first")]
    NotInitialized,

    #[error("result set has no column named {0}")]
    MissingColumn(String),

    #[error("invalid retrieval options: {0}")]
    InvalidOptions(String),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractorError {
    pub fn database(kind: DbErrorKind, code: Option<i32>, message: impl Into<String>) -> Self {
        ExtractorError::Database {
            kind,
            code,
            message: message.into(),
        }
    }

    /// The hint to print alongside this error, if it carries one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ExtractorError::Database { kind, .. } => Some(kind.hint()),
            ExtractorError::Config(_) => {
                Some("create a .env file with DB_USER, DB_PASSWORD and DB_CONNECT_STRING")
            }
            _ => None,
        }
    }
}
