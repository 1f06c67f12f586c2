use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    /// The source does not have the requested tile. Recoverable: the
    /// pool falls through to the next source in preference order.
    #[error("tile not available from this source")]
    NotFound,

    /// The remote login flow no longer looks like we expect. Fatal:
    /// retrying won't help.
    #[error("login flow changed: {0}")]
    Auth(String),

    #[error("unexpected content type {actual}, wanted {expected}")]
    ContentType { expected: String, actual: String },

    /// No local index and the coverage manifest could not be turned
    /// into one. Fatal for this source; others are still tried.
    #[error("no usable coverage index: {0}")]
    IndexUnavailable(String),

    #[error("unknown source {0}")]
    UnknownSource(String),

    #[error("missing credentials for source {0}")]
    Credentials(&'static str),

    #[error("HTTP {0} from {1}")]
    Status(u16, String),

    #[error("invalid coverage manifest: {0}")]
    Manifest(String),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Grid(#[from] tilegrid::GridError),
}
