use serde::{Deserialize, Serialize};

/// File type bits of a unix mode (`st_mode & S_IFMT`)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType(u32);

bitflags! {
    impl FileType: u32 {
        const FIFO = 0o010000;
        const CHR = 0o020000;
        const DIR = 0o040000;
        const BLK = 0o060000;
        const REG = 0o100000;
        const LNK = 0o120000;
        const SOCK = 0o140000;
    }
}

impl FileType {
    /// Mask selecting the file type bits
    pub const MASK: u32 = 0o170000;

    /// Extracts the type bits of a full mode value.
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        Self::from_bits_retain(mode & Self::MASK)
    }
}

/// Attributes of a remote entry as reported by a single stat or readdir
/// response.
///
/// Every field is optional because servers may omit any of them. `atime`
/// and `mtime` are seconds since the epoch; `permissions` is the full
/// `st_mode` including the [`FileType`] bits.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub permissions: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
}

impl FileAttributes {
    /// Returns the file type bits, if the server reported a mode
    #[must_use]
    pub fn file_type(&self) -> Option<FileType> {
        self.permissions.map(FileType::from_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::{FileAttributes, FileType};

    #[test]
    fn type_is_an_exact_match_of_the_format_bits() {
        assert_eq!(FileType::from_mode(0o100644), FileType::REG);
        assert_eq!(FileType::from_mode(0o040755), FileType::DIR);
        // a block device shares bits with DIR and CHR but is its own type
        assert_eq!(FileType::from_mode(0o060600), FileType::BLK);
        assert_ne!(FileType::from_mode(0o060600), FileType::DIR);
        assert_eq!(FileType::from_mode(0o4755), FileType::empty());
    }

    #[test]
    fn missing_mode_has_no_type() {
        assert_eq!(FileAttributes::default().file_type(), None);
    }
}
