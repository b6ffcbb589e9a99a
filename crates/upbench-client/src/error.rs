//! Client error types and their mapping onto transport exceptions

use reqwest::Url;
use std::error::Error as StdError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use upbench_core::{TransportError, TransportErrorKind};

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading the file to upload failed
    #[error("IO error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl ClientError {
    /// Convert into the structured exception reported for an attempt
    pub fn into_transport(self, url: &Url) -> TransportError {
        match self {
            Self::Http(e) => describe_reqwest(&e, url),
            Self::Config(msg) => TransportError::new(TransportErrorKind::Request, msg),
            Self::Io { path, source } => describe_io(&source, Some(&path)),
        }
    }
}

/// Describe a reqwest failure, keeping every root-cause detail it exposes
fn describe_reqwest(err: &reqwest::Error, url: &Url) -> TransportError {
    let dns = chain_mentions(err, "dns error") || chain_mentions(err, "failed to lookup address");
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() && dns {
        TransportErrorKind::Dns
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else if err.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    };

    let io_err = find_io_error(err);
    let code = match kind {
        TransportErrorKind::Dns => Some("ENOTFOUND"),
        TransportErrorKind::Timeout => Some("ETIMEDOUT"),
        _ => io_err.and_then(|e| io_code(e.kind())),
    };
    let syscall = match kind {
        TransportErrorKind::Dns => Some("getaddrinfo"),
        TransportErrorKind::Connect => Some("connect"),
        TransportErrorKind::Body => Some("read"),
        _ => None,
    };

    let mut described = TransportError::new(kind, err.to_string())
        .with_endpoint(url.host_str().map(str::to_string), url.port_or_known_default());
    described.code = code.map(str::to_string);
    described.errno = io_err.and_then(io::Error::raw_os_error);
    described.syscall = syscall.map(str::to_string);
    described.cause = innermost_cause(err);
    described
}

/// Describe a local file failure
fn describe_io(err: &io::Error, path: Option<&Path>) -> TransportError {
    let message = match path {
        Some(path) => format!("{}: {}", path.display(), err),
        None => err.to_string(),
    };
    let mut described = TransportError::new(TransportErrorKind::Io, message);
    described.code = io_code(err.kind())
        .or(match err.kind() {
            io::ErrorKind::NotFound => Some("ENOENT"),
            io::ErrorKind::PermissionDenied => Some("EACCES"),
            _ => None,
        })
        .map(str::to_string);
    described.errno = err.raw_os_error();
    described.syscall = Some("read".to_string());
    described
}

fn io_code(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
        io::ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
        io::ErrorKind::NotConnected => Some("ENOTCONN"),
        io::ErrorKind::AddrNotAvailable => Some("EADDRNOTAVAIL"),
        io::ErrorKind::BrokenPipe => Some("EPIPE"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::UnexpectedEof => Some("ECONNRESET"),
        _ => None,
    }
}

fn sources<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

fn find_io_error(err: &reqwest::Error) -> Option<&io::Error> {
    sources(err).find_map(|e| e.downcast_ref::<io::Error>())
}

fn chain_mentions(err: &reqwest::Error, needle: &str) -> bool {
    sources(err).any(|e| e.to_string().contains(needle))
}

fn innermost_cause(err: &reqwest::Error) -> Option<String> {
    sources(err).skip(1).last().map(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_described() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        let described = describe_io(&err, Some(Path::new("/nope/a.jpg")));
        assert_eq!(described.kind, TransportErrorKind::Io);
        assert_eq!(described.code.as_deref(), Some("ENOENT"));
        assert!(described.message.starts_with("/nope/a.jpg"));
    }

    #[test]
    fn test_os_errors_keep_errno() {
        let err = io::Error::from_raw_os_error(111);
        let described = describe_io(&err, None);
        assert_eq!(described.errno, Some(111));
    }

    #[test]
    fn test_read_failure_keeps_path_through_conversion() {
        let url = Url::parse("https://api.example.test/v1_1/demo/auto/upload").unwrap();
        let err = ClientError::Io {
            path: PathBuf::from("/assets/a.jpg"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };

        let described = err.into_transport(&url);

        assert_eq!(described.kind, TransportErrorKind::Io);
        assert_eq!(described.code.as_deref(), Some("EACCES"));
        assert!(described.message.starts_with("/assets/a.jpg"));
    }

    #[test]
    fn test_config_error_becomes_request_error() {
        let url = Url::parse("https://api.example.test/").unwrap();
        let described = ClientError::Config("bad header".into()).into_transport(&url);
        assert_eq!(described.kind, TransportErrorKind::Request);
    }

    #[test]
    fn test_source_chain_is_walked_to_the_root() {
        #[derive(Debug, thiserror::Error)]
        #[error("sending request")]
        struct Outer(#[source] Middle);

        #[derive(Debug, thiserror::Error)]
        #[error("connecting")]
        struct Middle(#[source] io::Error);

        let err = Outer(Middle(io::Error::from(io::ErrorKind::ConnectionReset)));

        let chain: Vec<String> = sources(&err).map(|e| e.to_string()).collect();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], "sending request");
        assert_eq!(chain[1], "connecting");
        let io = sources(&err).find_map(|e| e.downcast_ref::<io::Error>()).unwrap();
        assert_eq!(io_code(io.kind()), Some("ECONNRESET"));
    }

    #[test]
    fn test_io_codes() {
        assert_eq!(io_code(io::ErrorKind::ConnectionRefused), Some("ECONNREFUSED"));
        assert_eq!(io_code(io::ErrorKind::Other), None);
    }
}
