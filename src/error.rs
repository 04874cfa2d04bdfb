//! Error taxonomy of the acquisition pipeline.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not resolve host {host}: {message}")]
    Resolution { host: String, message: String },

    #[error("crawling {url} failed: {source}")]
    Crawl {
        url: String,
        #[source]
        source: Box<Error>,
    },

    #[error("downloading {url} failed after {attempts} attempts: {message}")]
    Download {
        url: String,
        attempts: usize,
        message: String,
    },

    #[error("cannot route {name}: {reason}")]
    Routing { name: String, reason: String },

    #[error("incompatible table header: {0}")]
    IncompatibleHeader(String),

    #[error("transcoding {path} failed: {message}")]
    Transcode { path: PathBuf, message: String },

    #[error("storing {path} failed: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn routing(name: &str, reason: impl Into<String>) -> Self {
        Error::Routing {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Only a failing write to the download tree stops the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Persistence { .. })
    }
}
