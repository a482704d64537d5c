use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use super::ModeBits;
use crate::{
    client::error::{Error, SftpResult},
    protocol::{FileAttributes, FileType},
};

/// Type of a remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Fifo,
    Socket,
}

impl EntryKind {
    /// Returns the character `ls -l` shows for the kind
    #[must_use]
    pub fn glyph(self) -> char {
        match self {
            Self::Directory => 'd',
            Self::File => '-',
            Self::BlockDevice => 'b',
            Self::CharacterDevice => 'c',
            Self::Symlink => 'l',
            Self::Fifo => 'p',
            Self::Socket => 's',
        }
    }

    /// Decodes the file type bits of a full mode value.
    #[must_use]
    pub fn from_mode(mode: u32) -> Option<Self> {
        match FileType::from_mode(mode) {
            FileType::REG => Some(Self::File),
            FileType::DIR => Some(Self::Directory),
            FileType::LNK => Some(Self::Symlink),
            FileType::BLK => Some(Self::BlockDevice),
            FileType::CHR => Some(Self::CharacterDevice),
            FileType::FIFO => Some(Self::Fifo),
            FileType::SOCK => Some(Self::Socket),
            _ => None,
        }
    }
}

/// Metadata of a single remote entry, read-only once built.
///
/// Timestamps are kept in milliseconds since the epoch. Exactly one kind
/// predicate is true; attributes whose mode matches no kind are rejected
/// when converting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    uid: u32,
    gid: u32,
    size: u64,
    atime: u64,
    mtime: u64,
    kind: EntryKind,
    permissions: ModeBits,
}

impl Metadata {
    /// Wraps the attributes reported for `path`.
    ///
    /// # Errors
    ///
    /// [`Error::UnrecognizedEntryKind`] if the mode carries no known file
    /// type.
    pub fn from_attributes(path: &str, attrs: &FileAttributes) -> SftpResult<Self> {
        let mode = attrs.permissions.unwrap_or(0);
        let kind = EntryKind::from_mode(mode).ok_or_else(|| Error::UnrecognizedEntryKind {
            path: path.to_owned(),
            mode,
        })?;

        Ok(Self {
            uid: attrs.uid.unwrap_or(0),
            gid: attrs.gid.unwrap_or(0),
            size: attrs.size.unwrap_or(0),
            atime: u64::from(attrs.atime.unwrap_or(0)) * 1000,
            mtime: u64::from(attrs.mtime.unwrap_or(0)) * 1000,
            kind,
            permissions: ModeBits::new(mode),
        })
    }

    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    #[must_use]
    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Returns the size of the file in bytes
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Last access, in milliseconds since the epoch
    #[must_use]
    pub fn atime(&self) -> u64 {
        self.atime
    }

    /// Last modification, in milliseconds since the epoch
    #[must_use]
    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    #[must_use]
    pub fn accessed(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.atime)
    }

    #[must_use]
    pub fn modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.mtime)
    }

    #[must_use]
    pub fn accessed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.atime).ok()?)
    }

    #[must_use]
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.mtime).ok()?)
    }

    #[must_use]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    #[must_use]
    pub fn permissions(&self) -> ModeBits {
        self.permissions
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    #[must_use]
    pub fn is_block_device(&self) -> bool {
        self.kind == EntryKind::BlockDevice
    }

    #[must_use]
    pub fn is_char_device(&self) -> bool {
        self.kind == EntryKind::CharacterDevice
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.kind == EntryKind::Fifo
    }

    #[must_use]
    pub fn is_socket(&self) -> bool {
        self.kind == EntryKind::Socket
    }

    /// Renders the kind glyph followed by the permissions, e.g. `drwxr-xr-x`
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.glyph(), self.permissions)
    }
}
