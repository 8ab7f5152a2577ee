//
// Errors.
//
use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;

/// Error returned by the storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Path does not resolve to a backend, or the backend reports absence.
    NotFound,
    /// Backend refused the operation.
    Forbidden,
    /// Target already exists.
    Exists,
    /// Byte-level operation on a directory.
    IsDirectory,
    /// The backend does not support this operation.
    NotImplemented,
    /// The transfer was cut short: client went away, context canceled,
    /// or the input ended early. Not a server failure.
    Interrupted,
    GeneralFailure,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let desc = match self {
            FsError::NotFound => "not found",
            FsError::Forbidden => "forbidden",
            FsError::Exists => "already exists",
            FsError::IsDirectory => "is a directory",
            FsError::NotImplemented => "not implemented",
            FsError::Interrupted => "interrupted",
            FsError::GeneralFailure => "general failure",
        };
        f.write_str(desc)
    }
}

impl Error for FsError {}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::Forbidden,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::WriteZero
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::UnexpectedEof => FsError::Interrupted,
            _ => FsError::GeneralFailure,
        }
    }
}

impl FsError {
    /// Disconnect-class errors are logged at debug level and never
    /// reported as server failures.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, FsError::Interrupted)
    }
}

/// The webdav handler error type, mapping every failure to an
/// HTTP status.
#[derive(Debug)]
pub enum DavError {
    UnknownDavMethod,
    Utf8Error,
    XmlParseError,
    InvalidPath,
    InvalidDepth,
    InvalidDestination,
    /// Destination host differs from the request host.
    CrossHostDestination,
    DestinationEqualsSource,
    /// Unsatisfiable `Range` header against a known size.
    RangeNotSatisfiable(u64),
    Status(StatusCode),
    /// As `Status`, but the connection cannot be reused.
    StatusClose(StatusCode),
    Fs(FsError),
    Io(io::Error),
}

impl fmt::Display for DavError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DavError::UnknownDavMethod => write!(f, "method not supported"),
            DavError::Utf8Error => write!(f, "invalid utf-8"),
            DavError::XmlParseError => write!(f, "XML parse error"),
            DavError::InvalidPath => write!(f, "invalid path"),
            DavError::InvalidDepth => write!(f, "invalid Depth header"),
            DavError::InvalidDestination => write!(f, "invalid Destination header"),
            DavError::CrossHostDestination => write!(f, "Destination on another host"),
            DavError::DestinationEqualsSource => write!(f, "destination equals source"),
            DavError::RangeNotSatisfiable(size) => {
                write!(f, "range not satisfiable against size {}", size)
            }
            DavError::Status(s) | DavError::StatusClose(s) => write!(f, "{}", s),
            DavError::Fs(e) => write!(f, "{}", e),
            DavError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::Fs(e) => Some(e),
            DavError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::Fs(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::Io(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

impl DavError {
    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::UnknownDavMethod => StatusCode::METHOD_NOT_ALLOWED,
            DavError::Utf8Error
            | DavError::XmlParseError
            | DavError::InvalidPath
            | DavError::InvalidDepth
            | DavError::InvalidDestination => StatusCode::BAD_REQUEST,
            DavError::CrossHostDestination => StatusCode::BAD_GATEWAY,
            DavError::DestinationEqualsSource => StatusCode::FORBIDDEN,
            DavError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            DavError::Status(s) | DavError::StatusClose(s) => *s,
            DavError::Fs(e) => fs_statuscode(*e),
            DavError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_) | DavError::Io(_))
    }
}

fn fs_statuscode(e: FsError) -> StatusCode {
    match e {
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Forbidden => StatusCode::FORBIDDEN,
        // An existing target and a refused/unsupported operation both
        // surface as "method not allowed on this resource".
        FsError::Exists | FsError::IsDirectory | FsError::NotImplemented => {
            StatusCode::METHOD_NOT_ALLOWED
        }
        FsError::Interrupted | FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
