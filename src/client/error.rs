use std::io;
use thiserror::Error;

use super::lifecycle::State;
use crate::{protocol::StatusCode, transport::ChannelError};

pub type SftpResult<T> = Result<T, Error>;

/// Enum for client errors.
///
/// Every variant names the action and the path(s) it concerns so the
/// message alone tells what was attempted and on what.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Cannot change the client state from '{from}' to '{to}'")]
    InvalidStateTransition { from: State, to: String },
    #[error("Cannot execute the '{action}' action, the client has an invalid state '{state}'")]
    NotConnected { action: &'static str, state: State },
    #[error("Cannot connect to the SFTP server: exactly one of password or private key must be provided")]
    MissingCredentials,
    #[error("Cannot connect to the SFTP server {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        code: StatusCode,
        message: String,
    },
    #[error("Failed to {action} '{path}': no such file")]
    NoSuchPath { action: &'static str, path: String },
    #[error("Failed to {action} '{path}': no such directory")]
    NoSuchDirectory { action: &'static str, path: String },
    #[error("Cannot create directory '{path}', the path does already exist")]
    PathAlreadyExists { path: String },
    #[error("Cannot create directory '{path}', the parent directory '{parent}' does not exist")]
    MissingParent { path: String, parent: String },
    #[error("Cannot {action} '{path}': path is not a directory")]
    NotADirectory { action: &'static str, path: String },
    #[error("Cannot delete directory '{path}': it contains files")]
    DirectoryNotEmpty { path: String },
    #[error("Cannot delete file '{path}': path is a directory")]
    IsADirectory { path: String },
    #[error("Cannot delete file '{path}': path is not a file or symbolic link")]
    NotARegularFileOrLink { path: String },
    #[error("Cannot move path '{from}': it does not exist")]
    SourceNotFound { from: String, to: String },
    #[error("Cannot move path '{from}': target path '{to}' exists already")]
    TargetAlreadyExists { from: String, to: String },
    #[error("Cannot set permissions on path '{path}': path does not exist")]
    TargetNotFound { path: String },
    #[error("Failed to {action} '{path}': {code}: {message}")]
    RemoteOperationFailed {
        action: &'static str,
        path: String,
        code: StatusCode,
        message: String,
    },
    #[error("Unrecognized entry kind for '{path}' (mode {mode:#o})")]
    UnrecognizedEntryKind { path: String, mode: u32 },
}

impl Error {
    /// Attaches the action and path to an error reported by the transport.
    ///
    /// `NoSuchFile` becomes [`Error::NoSuchPath`], everything else is kept
    /// as [`Error::RemoteOperationFailed`] with the original message.
    pub(crate) fn remote<P: Into<String>>(action: &'static str, path: P, err: ChannelError) -> Self {
        match err.code {
            StatusCode::NoSuchFile => Self::NoSuchPath {
                action,
                path: path.into(),
            },
            code => Self::RemoteOperationFailed {
                action,
                path: path.into(),
                code,
                message: err.message,
            },
        }
    }

    /// Same as [`Error::remote`] for operations whose target must be a
    /// directory.
    pub(crate) fn remote_dir<P: Into<String>>(
        action: &'static str,
        path: P,
        err: ChannelError,
    ) -> Self {
        match err.code {
            StatusCode::NoSuchFile => Self::NoSuchDirectory {
                action,
                path: path.into(),
            },
            _ => Self::remote(action, path, err),
        }
    }

    /// Attaches the action and path to an I/O error raised by a stream.
    pub(crate) fn io<P: Into<String>>(action: &'static str, path: P, err: &io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => StatusCode::NoSuchFile,
            io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
            io::ErrorKind::UnexpectedEof => StatusCode::Eof,
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                StatusCode::ConnectionLost
            }
            _ => StatusCode::Failure,
        };

        Self::remote(action, path, ChannelError::new(code, err.to_string()))
    }

    /// Returns `true` if the error reports a path that does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchPath { .. } | Self::NoSuchDirectory { .. })
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::NoSuchPath { .. } | Error::NoSuchDirectory { .. } => io::ErrorKind::NotFound,
            Error::NotConnected { .. } => io::ErrorKind::NotConnected,
            Error::RemoteOperationFailed {
                code: StatusCode::PermissionDenied,
                ..
            } => io::ErrorKind::PermissionDenied,
            _ => io::ErrorKind::Other,
        };

        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::{protocol::StatusCode, transport::ChannelError};

    #[test]
    fn no_such_file_is_distinguished() {
        let err = Error::remote("stat", "/a", ChannelError::new(StatusCode::NoSuchFile, "gone"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Failed to stat '/a': no such file");

        let err = Error::remote_dir(
            "list",
            "/a",
            ChannelError::new(StatusCode::NoSuchFile, "gone"),
        );
        assert_eq!(err.to_string(), "Failed to list '/a': no such directory");
    }

    #[test]
    fn other_codes_keep_the_original_message() {
        let err = Error::remote(
            "delete file",
            "/etc/passwd",
            ChannelError::new(StatusCode::PermissionDenied, "denied by policy"),
        );
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Failed to delete file '/etc/passwd': Permission denied: denied by policy"
        );
    }
}
