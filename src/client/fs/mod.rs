//! Filesystem manipulation types.
//!
//! Values returned by and handed to [`SftpClient`](crate::SftpClient):
//! entry metadata with its permission bits, directory listings and the
//! streams used for transfers.

mod dir;
mod file;
mod metadata;
mod mode;

pub(crate) use dir::is_self_or_parent;
pub use dir::{DirEntry, ReadDir};
pub use file::{PauseHandle, ReadStream, StreamEvent, WriteStream};
pub use metadata::{EntryKind, Metadata};
pub use mode::{ModeBits, Permission, Principal, Triplet};
