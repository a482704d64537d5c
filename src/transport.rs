//! The collaborator the client is built on.
//!
//! A [`Transport`] opens an authenticated [`Connection`] to a host, the
//! connection hands out a [`FileChannel`] and the channel performs the
//! primitive remote operations. [`SftpClient`](crate::SftpClient) never
//! talks to the network itself; bring your own transport or enable the
//! `ssh` feature for one built on `russh`.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    config::Credentials,
    protocol::{FileAttributes, StatusCode},
};

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Byte source for a remote file opened for reading
pub type ReadHandle = Box<dyn AsyncRead + Send + Unpin>;

/// Byte sink for a remote file opened for writing
pub type WriteHandle = Box<dyn AsyncWrite + Send + Unpin>;

/// Failure reported by a transport. `code` is the discriminator the client
/// dispatches on, [`StatusCode::NoSuchFile`] meaning the path does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ChannelError {
    pub code: StatusCode,
    pub message: String,
}

impl ChannelError {
    pub fn new<M: Into<String>>(code: StatusCode, message: M) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<StatusCode> for ChannelError {
    fn from(code: StatusCode) -> Self {
        Self::new(code, code.to_string())
    }
}

/// Establishes connections to a remote host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Suspends until the host accepted the credentials or the attempt
    /// failed.
    async fn connect(
        &mut self,
        hostname: &str,
        port: u16,
        username: &str,
        credentials: &Credentials,
    ) -> ChannelResult<Box<dyn Connection>>;
}

/// An established, authenticated connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Negotiates the channel carrying file operations.
    async fn open_file_channel(&mut self) -> ChannelResult<Box<dyn FileChannel>>;

    /// Tears the connection down.
    async fn disconnect(&mut self) -> ChannelResult<()>;
}

/// Primitive remote file operations, one request in flight at a time.
///
/// Each call is a single round trip. Paths are remote POSIX paths and are
/// passed through unchanged.
#[async_trait]
pub trait FileChannel: Send + Sync {
    async fn stat(&mut self, path: &str) -> ChannelResult<FileAttributes>;

    /// Lists a directory. Entries `.` and `..` may be included.
    async fn read_dir(&mut self, path: &str) -> ChannelResult<Vec<(String, FileAttributes)>>;

    async fn mkdir(&mut self, path: &str) -> ChannelResult<()>;

    async fn unlink(&mut self, path: &str) -> ChannelResult<()>;

    async fn rmdir(&mut self, path: &str) -> ChannelResult<()>;

    async fn rename(&mut self, from: &str, to: &str) -> ChannelResult<()>;

    /// Sets the permission bits; `mode` carries no file type bits.
    async fn chmod(&mut self, path: &str, mode: u32) -> ChannelResult<()>;

    async fn open_read(&mut self, path: &str) -> ChannelResult<ReadHandle>;

    /// Opens a file for writing, creating or truncating it.
    async fn open_write(&mut self, path: &str) -> ChannelResult<WriteHandle>;

    async fn close(&mut self) -> ChannelResult<()>;
}
