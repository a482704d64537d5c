use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for SSH_FXP_STATUS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    #[error("Ok")]
    Ok = 0,
    #[error("Eof")]
    Eof = 1,
    #[error("No such file")]
    NoSuchFile = 2,
    #[error("Permission denied")]
    PermissionDenied = 3,
    #[error("Failure")]
    Failure = 4,
    #[error("Bad message")]
    BadMessage = 5,
    #[error("No connection")]
    NoConnection = 6,
    #[error("Connection lost")]
    ConnectionLost = 7,
    #[error("Operation unsupported")]
    OpUnsupported = 8,
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Eof,
            2 => Self::NoSuchFile,
            3 => Self::PermissionDenied,
            5 => Self::BadMessage,
            6 => Self::NoConnection,
            7 => Self::ConnectionLost,
            8 => Self::OpUnsupported,
            _ => Self::Failure,
        }
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code as u32
    }
}

#[cfg(test)]
mod tests {
    use super::StatusCode;

    #[test]
    fn unknown_codes_become_failure() {
        assert_eq!(StatusCode::from(2), StatusCode::NoSuchFile);
        assert_eq!(StatusCode::from(4), StatusCode::Failure);
        assert_eq!(StatusCode::from(31), StatusCode::Failure);
        assert_eq!(u32::from(StatusCode::PermissionDenied), 3);
    }
}
