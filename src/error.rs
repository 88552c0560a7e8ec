use std::io;

use thiserror::Error;

/// A malformed scan request. Reported before any socket is opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid IPv4 address: {0:?}")]
    InvalidAddress(String),

    #[error("port out of range: {0}")]
    InvalidPort(u32),

    #[error("invalid range {start}-{end} (start > end)")]
    InvalidRange { start: u16, end: u16 },
}

/// Errors surfaced to the caller of [`Scanner::start`](crate::scanner::Scanner::start).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a scan is already in progress")]
    AlreadyScanning,
}

/// Why a single probe found nothing. Absorbed by the pool, logged only.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("connect timed out")]
    TimedOut,

    #[error("connection refused")]
    Refused,

    #[error("host or network unreachable")]
    Unreachable,

    #[error("out of sockets or file descriptors")]
    Exhausted,

    #[error("connect failed: {0}")]
    Other(io::ErrorKind),
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        if is_exhaustion(&err) {
            return ProbeError::Exhausted;
        }
        match err.kind() {
            io::ErrorKind::TimedOut => ProbeError::TimedOut,
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                ProbeError::Refused
            }
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                ProbeError::Unreachable
            }
            kind => ProbeError::Other(kind),
        }
    }
}

// EMFILE / ENFILE on unix, WSAEMFILE on windows.
fn is_exhaustion(err: &io::Error) -> bool {
    match err.raw_os_error() {
        #[cfg(unix)]
        Some(23) | Some(24) => true,
        #[cfg(windows)]
        Some(10024) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_probe_errors() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(ProbeError::from(refused), ProbeError::Refused);

        let other = io::Error::from(io::ErrorKind::AddrNotAvailable);
        assert_eq!(
            ProbeError::from(other),
            ProbeError::Other(io::ErrorKind::AddrNotAvailable)
        );
    }

    #[cfg(unix)]
    #[test]
    fn too_many_open_files_is_exhaustion() {
        let emfile = io::Error::from_raw_os_error(24);
        assert_eq!(ProbeError::from(emfile), ProbeError::Exhausted);
    }

    #[test]
    fn validation_converts_into_scan_error() {
        let err: ScanError = ValidationError::InvalidPort(0).into();
        assert_eq!(err.to_string(), "port out of range: 0");
    }
}
