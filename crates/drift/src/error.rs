use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to {target}: {source}")]
    Connection {
        /// Connection descriptor with the password masked
        target: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("catalog query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("unexpected catalog row ({location}): {reason}")]
    UnexpectedRow { location: String, reason: String },

    #[error("{path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
