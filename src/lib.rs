//! Filesystem-style client for remote hosts speaking SFTP.
//!
//! [`SftpClient`] wraps a [`Transport`](transport::Transport) and offers
//! checked tree operations (recursive create and delete, move, chmod),
//! streaming transfers with pause and backpressure, and typed POSIX
//! [`ModeBits`]. Every failure is an [`Error`] that names the attempted
//! action and path.
//!
//! ```no_run
//! # async fn run() -> sftp_fs::SftpResult<()> {
//! use sftp_fs::{memory::{MemoryFs, MemoryTransport}, ConnectOptions, SftpClient};
//!
//! let mut client = SftpClient::new(MemoryTransport::new(MemoryFs::new()));
//! client
//!     .connect(&ConnectOptions::new("localhost", 22, "demo").with_password("secret"))
//!     .await?;
//! client.create_directory("/upload/logs", true).await?;
//! client.put_file("/upload/logs/today.txt", b"hello").await?;
//! client.end().await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate async_trait;

/// Client side
pub mod client;
/// Connection and stream settings
pub mod config;
/// In-memory transport
pub mod memory;
/// Protocol constants and attributes
pub mod protocol;
/// SSH transport
#[cfg(feature = "ssh")]
pub mod ssh;
pub mod transport;
mod utils;

pub use client::{
    error::{Error, SftpResult},
    fs::{
        DirEntry, EntryKind, Metadata, ModeBits, PauseHandle, Permission, Principal, ReadDir,
        ReadStream, StreamEvent, Triplet, WriteStream,
    },
    lifecycle::{Lifecycle, State},
    SftpClient,
};
pub use config::{ConnectOptions, Credentials, StreamOptions};
