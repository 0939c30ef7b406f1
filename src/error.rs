// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::{error, fmt, io, result, sync};

/// An error reported by the server in an ERR packet.
#[derive(Eq, PartialEq, Clone)]
pub struct MySqlError {
    pub state: String,
    pub message: String,
    pub code: u16,
}

impl MySqlError {
    /// Whether this error ends the session. Errors in this set leave the
    /// connection unusable, so a pool must discard it instead of reusing it.
    pub fn is_fatal(&self) -> bool {
        // ER_SERVER_SHUTDOWN, ER_ABORTING_CONNECTION, ER_NET_READ_INTERRUPTED,
        // ER_CONNECTION_KILLED
        matches!(self.code, 1053 | 1152 | 1184 | 1927)
    }

    /// Whether the statement was cancelled with a KILL QUERY. The session
    /// itself survives this one.
    pub fn is_interrupted(&self) -> bool {
        // ER_QUERY_INTERRUPTED
        self.code == 1317
    }
}

impl fmt::Display for MySqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR {} ({}): {}", self.code, self.state, self.message)
    }
}

impl fmt::Debug for MySqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for MySqlError {
    fn description(&self) -> &str {
        "Error returned by a server"
    }
}

pub enum Error {
    IoError(io::Error),
    MySqlError(MySqlError),
    DriverError(DriverError),
    #[cfg(feature = "native-tls")]
    TlsError(native_tls::Error),
}

impl Error {
    /// Whether the error indicates a dead or unusable connection.
    pub fn is_connectivity_error(&self) -> bool {
        match self {
            #[cfg(feature = "native-tls")]
            Error::TlsError(_) => true,
            Error::IoError(_) | Error::DriverError(_) => true,
            Error::MySqlError(ref err) => err.is_fatal(),
        }
    }

    pub(crate) fn server_disconnected() -> Self {
        Error::IoError(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "server disconnected",
        ))
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&dyn error::Error> {
        match *self {
            Error::IoError(ref err) => Some(err),
            Error::DriverError(ref err) => Some(err),
            Error::MySqlError(ref err) => Some(err),
            #[cfg(feature = "native-tls")]
            Error::TlsError(ref err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Error {
        Error::DriverError(err)
    }
}

impl From<MySqlError> for Error {
    fn from(x: MySqlError) -> Error {
        Error::MySqlError(x)
    }
}

#[cfg(feature = "native-tls")]
impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Error {
        Error::TlsError(err)
    }
}

#[cfg(feature = "native-tls")]
impl<S> From<native_tls::HandshakeError<S>> for Error {
    fn from(err: native_tls::HandshakeError<S>) -> Error {
        match err {
            native_tls::HandshakeError::Failure(err) => Error::TlsError(err),
            native_tls::HandshakeError::WouldBlock(_) => {
                Error::IoError(io::Error::new(io::ErrorKind::WouldBlock, "would block"))
            }
        }
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Error {
        Error::DriverError(DriverError::PoisonedPoolMutex)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => write!(f, "IoError {{ {} }}", err),
            Error::MySqlError(ref err) => write!(f, "MySqlError {{ {} }}", err),
            Error::DriverError(ref err) => write!(f, "DriverError {{ {} }}", err),
            #[cfg(feature = "native-tls")]
            Error::TlsError(ref err) => write!(f, "TlsError {{ {} }}", err),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Eq, PartialEq, Clone)]
pub enum DriverError {
    ConnectTimeout,
    // (address, description)
    CouldNotConnect(Option<(String, String, io::ErrorKind)>),
    UnsupportedProtocol(u8),
    PacketOutOfSync,
    PacketTooLarge,
    UnexpectedPacket,
    MismatchedStmtParams(u16, usize),
    InvalidPoolConstraints,
    SetupError,
    TlsNotSupported,
    CouldNotParseVersion,
    PoisonedPoolMutex,
    Timeout,
    MissingNamedParameter(String),
    NamedParamsForPositionalQuery,
    MixedParams,
    OldScrambleDisabled,
    PoolCleared,
}

impl error::Error for DriverError {
    fn description(&self) -> &str {
        "MySql driver error"
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DriverError::ConnectTimeout => write!(f, "Could not connect: connection timeout"),
            DriverError::CouldNotConnect(None) => {
                write!(f, "Could not connect: address not specified")
            }
            DriverError::CouldNotConnect(Some((ref addr, ref desc, _))) => {
                write!(f, "Could not connect to address `{}': {}", addr, desc)
            }
            DriverError::UnsupportedProtocol(proto_version) => {
                write!(f, "Unsupported protocol version {}", proto_version)
            }
            DriverError::PacketOutOfSync => write!(f, "Packet out of sync"),
            DriverError::PacketTooLarge => write!(f, "Packet too large"),
            DriverError::UnexpectedPacket => write!(f, "Unexpected packet"),
            DriverError::MismatchedStmtParams(exp, prov) => write!(
                f,
                "Statement takes {} parameters but {} was supplied",
                exp, prov
            ),
            DriverError::InvalidPoolConstraints => write!(f, "Invalid pool constraints"),
            DriverError::SetupError => write!(f, "Could not setup connection"),
            DriverError::TlsNotSupported => write!(
                f,
                "Client requires secure connection but server \
                 does not have this capability"
            ),
            DriverError::CouldNotParseVersion => write!(f, "Could not parse MySQL version"),
            DriverError::PoisonedPoolMutex => write!(f, "Poisoned pool mutex"),
            DriverError::Timeout => write!(f, "Operation timed out"),
            DriverError::MissingNamedParameter(ref name) => {
                write!(f, "Missing named parameter `{}' for statement", name)
            }
            DriverError::NamedParamsForPositionalQuery => {
                write!(f, "Can not pass named parameters to positional query")
            }
            DriverError::MixedParams => write!(
                f,
                "Can not mix named and positional parameters in one statement"
            ),
            DriverError::OldScrambleDisabled => write!(
                f,
                "Pre-4.1 password scramble is insecure and disabled by default"
            ),
            DriverError::PoolCleared => write!(f, "Pool was cleared while waiting for a session"),
        }
    }
}

impl fmt::Debug for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::MySqlError;

    #[test]
    fn fatal_server_errors_are_recognized() {
        let mut err = MySqlError {
            state: "08S01".into(),
            message: "Server shutdown in progress".into(),
            code: 1053,
        };
        assert!(err.is_fatal());
        err.code = 1927;
        assert!(err.is_fatal());
        err.code = 1317;
        assert!(!err.is_fatal());
        assert!(err.is_interrupted());
        err.code = 1064;
        assert!(!err.is_fatal());
        assert!(!err.is_interrupted());
    }
}
