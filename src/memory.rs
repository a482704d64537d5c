//! In-memory remote file system.
//!
//! [`MemoryTransport`] plays the server side for tests and benchmarks: it
//! answers every primitive operation from a [`MemoryFs`] tree, reports
//! failures with the status codes a real SFTP server uses and records each
//! call in order so tests can check what was sent.

use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap},
    io::{self, Cursor},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{
    config::Credentials,
    protocol::{FileAttributes, FileType, StatusCode},
    transport::{
        ChannelError, ChannelResult, Connection, FileChannel, ReadHandle, Transport, WriteHandle,
    },
    utils,
};

/// Kinds of operations, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Stat,
    ReadDir,
    Mkdir,
    Unlink,
    Rmdir,
    Rename,
    Chmod,
    OpenRead,
    OpenWrite,
    Read,
    Write,
}

/// A primitive operation received by the file system, with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stat(String),
    ReadDir(String),
    Mkdir(String),
    Unlink(String),
    Rmdir(String),
    Rename(String, String),
    Chmod(String, u32),
    OpenRead(String),
    OpenWrite(String),
    /// Read from an open read handle at the given offset
    Read(String, u64),
    /// Bytes handed to an open write handle
    Write(String, usize),
}

impl Call {
    #[must_use]
    pub fn op(&self) -> Op {
        match self {
            Self::Stat(_) => Op::Stat,
            Self::ReadDir(_) => Op::ReadDir,
            Self::Mkdir(_) => Op::Mkdir,
            Self::Unlink(_) => Op::Unlink,
            Self::Rmdir(_) => Op::Rmdir,
            Self::Rename(..) => Op::Rename,
            Self::Chmod(..) => Op::Chmod,
            Self::OpenRead(_) => Op::OpenRead,
            Self::OpenWrite(_) => Op::OpenWrite,
            Self::Read(..) => Op::Read,
            Self::Write(..) => Op::Write,
        }
    }

    /// `true` for calls that change the tree
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::Stat(_) | Self::ReadDir(_) | Self::OpenRead(_) | Self::Read(..)
        )
    }

    fn path(&self) -> &str {
        match self {
            Self::Stat(path)
            | Self::ReadDir(path)
            | Self::Mkdir(path)
            | Self::Unlink(path)
            | Self::Rmdir(path)
            | Self::Rename(path, _)
            | Self::Chmod(path, _)
            | Self::OpenRead(path)
            | Self::OpenWrite(path)
            | Self::Read(path, _)
            | Self::Write(path, _) => path,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: FileType,
    mode: u32,
    uid: u32,
    gid: u32,
    atime: u32,
    mtime: u32,
    data: Vec<u8>,
}

impl Node {
    fn new(kind: FileType, mode: u32) -> Self {
        let now = now();
        Self {
            kind,
            mode: mode & 0o7777,
            uid: 1000,
            gid: 1000,
            atime: now,
            mtime: now,
            data: Vec::new(),
        }
    }

    fn is_dir(&self) -> bool {
        self.kind == FileType::DIR
    }

    fn attributes(&self) -> FileAttributes {
        FileAttributes {
            size: Some(self.data.len() as u64),
            uid: Some(self.uid),
            gid: Some(self.gid),
            permissions: Some(self.kind.bits() | self.mode),
            atime: Some(self.atime),
            mtime: Some(self.mtime),
        }
    }
}

fn io_error(err: ChannelError) -> io::Error {
    let kind = match err.code {
        StatusCode::NoSuchFile => io::ErrorKind::NotFound,
        StatusCode::PermissionDenied => io::ErrorKind::PermissionDenied,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err.message)
}

fn now() -> u32 {
    u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX)
}

/// Reduces `path` to an absolute path without `.`, `..`, repeated or
/// trailing separators. Relative paths are taken relative to `/`.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                let _ = parts.pop();
            }
            part => parts.push(part),
        }
    }

    format!("/{}", parts.join("/"))
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    calls: Vec<Call>,
    failures: HashMap<(Op, String), ChannelError>,
    /// Reads of a path failing from an offset on
    read_failures: HashMap<String, (u64, ChannelError)>,
}

impl Tree {
    fn record(&mut self, call: Call) -> ChannelResult<()> {
        let key = (call.op(), normalize(call.path()));
        self.calls.push(call);

        match self.failures.get(&key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn node(&self, path: &str) -> ChannelResult<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| ChannelError::new(StatusCode::NoSuchFile, "No such file"))
    }

    fn children(&self, dir: &str) -> Vec<(String, &Node)> {
        self.nodes
            .iter()
            .filter(|(path, _)| path.as_str() != "/" && utils::parent(path) == dir)
            .map(|(path, node)| (path.rsplit('/').next().unwrap_or_default().to_owned(), node))
            .collect()
    }

    fn require_parent_dir(&self, path: &str) -> ChannelResult<()> {
        if self.node(&utils::parent(path))?.is_dir() {
            Ok(())
        } else {
            Err(ChannelError::new(StatusCode::Failure, "Not a directory"))
        }
    }

    fn insert_with_parents(&mut self, path: &str, node: Node) {
        let mut ancestors = Vec::new();
        let mut current = utils::parent(path);
        while !self.nodes.contains_key(&current) {
            ancestors.push(current.clone());
            current = utils::parent(&current);
        }

        for ancestor in ancestors.into_iter().rev() {
            let _ = self
                .nodes
                .insert(ancestor, Node::new(FileType::DIR, 0o755));
        }
        let _ = self.nodes.insert(path.to_owned(), node);
    }
}

/// Shared in-memory directory tree. Clones refer to the same tree.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    tree: Arc<Mutex<Tree>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Creates a tree holding only the root directory.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        let _ = nodes.insert("/".to_owned(), Node::new(FileType::DIR, 0o755));

        Self {
            tree: Arc::new(Mutex::new(Tree {
                nodes,
                calls: Vec::new(),
                failures: HashMap::new(),
                read_failures: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a directory, creating missing ancestors.
    pub fn add_dir(&self, path: &str) -> &Self {
        self.lock()
            .insert_with_parents(&normalize(path), Node::new(FileType::DIR, 0o755));
        self
    }

    /// Adds a regular file, creating missing ancestors.
    pub fn add_file(&self, path: &str, data: &[u8]) -> &Self {
        let mut node = Node::new(FileType::REG, 0o644);
        node.data = data.to_vec();
        self.lock().insert_with_parents(&normalize(path), node);
        self
    }

    /// Adds an entry of any kind (symlink, device, FIFO, socket).
    pub fn add_node(&self, path: &str, kind: FileType, mode: u32) -> &Self {
        self.lock()
            .insert_with_parents(&normalize(path), Node::new(kind, mode));
        self
    }

    /// Makes every later `op` on `path` fail with `code`.
    pub fn fail(&self, op: Op, path: &str, code: StatusCode) -> &Self {
        let _ = self.lock().failures.insert(
            (op, normalize(path)),
            ChannelError::new(code, format!("injected {op:?} failure")),
        );
        self
    }

    /// Makes reads of `path` fail with `code` once `offset` bytes were
    /// delivered, so a transfer breaks part way.
    pub fn fail_read_at(&self, path: &str, offset: u64, code: StatusCode) -> &Self {
        let _ = self.lock().read_failures.insert(
            normalize(path),
            (offset, ChannelError::new(code, format!("injected read failure at {offset}"))),
        );
        self
    }

    pub fn clear_failures(&self) {
        let mut tree = self.lock();
        tree.failures.clear();
        tree.read_failures.clear();
    }

    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(&normalize(path))
    }

    /// Returns the contents of a regular file
    #[must_use]
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .nodes
            .get(&normalize(path))
            .filter(|node| node.kind == FileType::REG)
            .map(|node| node.data.clone())
    }

    /// Returns the permission bits of an entry
    #[must_use]
    pub fn mode(&self, path: &str) -> Option<u32> {
        self.lock().nodes.get(&normalize(path)).map(|node| node.mode)
    }

    /// All paths in the tree, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.lock().nodes.keys().cloned().collect()
    }

    /// Calls received so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn stat(&self, path: &str) -> ChannelResult<FileAttributes> {
        let mut tree = self.lock();
        tree.record(Call::Stat(path.to_owned()))?;
        Ok(tree.node(&normalize(path))?.attributes())
    }

    fn read_dir(&self, path: &str) -> ChannelResult<Vec<(String, FileAttributes)>> {
        let mut tree = self.lock();
        tree.record(Call::ReadDir(path.to_owned()))?;

        let dir = normalize(path);
        let node = tree.node(&dir)?;
        if !node.is_dir() {
            return Err(ChannelError::new(StatusCode::Failure, "Not a directory"));
        }

        let mut entries = vec![
            (".".to_owned(), node.attributes()),
            ("..".to_owned(), tree.node(&utils::parent(&dir))?.attributes()),
        ];
        entries.extend(
            tree.children(&dir)
                .into_iter()
                .map(|(name, node)| (name, node.attributes())),
        );

        Ok(entries)
    }

    fn mkdir(&self, path: &str) -> ChannelResult<()> {
        let mut tree = self.lock();
        tree.record(Call::Mkdir(path.to_owned()))?;

        let path = normalize(path);
        if tree.nodes.contains_key(&path) {
            return Err(ChannelError::new(StatusCode::Failure, "File exists"));
        }
        tree.require_parent_dir(&path)?;

        let _ = tree.nodes.insert(path, Node::new(FileType::DIR, 0o755));
        Ok(())
    }

    fn unlink(&self, path: &str) -> ChannelResult<()> {
        let mut tree = self.lock();
        tree.record(Call::Unlink(path.to_owned()))?;

        let path = normalize(path);
        if tree.node(&path)?.is_dir() {
            return Err(ChannelError::new(StatusCode::Failure, "Is a directory"));
        }

        let _ = tree.nodes.remove(&path);
        Ok(())
    }

    fn rmdir(&self, path: &str) -> ChannelResult<()> {
        let mut tree = self.lock();
        tree.record(Call::Rmdir(path.to_owned()))?;

        let path = normalize(path);
        if !tree.node(&path)?.is_dir() {
            return Err(ChannelError::new(StatusCode::Failure, "Not a directory"));
        }
        if path == "/" || !tree.children(&path).is_empty() {
            return Err(ChannelError::new(StatusCode::Failure, "Directory not empty"));
        }

        let _ = tree.nodes.remove(&path);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> ChannelResult<()> {
        let mut tree = self.lock();
        tree.record(Call::Rename(from.to_owned(), to.to_owned()))?;

        let (from, to) = (normalize(from), normalize(to));
        let _ = tree.node(&from)?;
        if tree.nodes.contains_key(&to) {
            return Err(ChannelError::new(StatusCode::Failure, "File exists"));
        }
        tree.require_parent_dir(&to)?;
        if to.starts_with(&format!("{from}/")) {
            return Err(ChannelError::new(
                StatusCode::Failure,
                "Cannot move a directory into itself",
            ));
        }

        let prefix = format!("{from}/");
        let moved: Vec<String> = tree
            .nodes
            .keys()
            .filter(|path| **path == from || path.starts_with(&prefix))
            .cloned()
            .collect();

        for old in moved {
            if let Some(node) = tree.nodes.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                let _ = tree.nodes.insert(new, node);
            }
        }

        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> ChannelResult<()> {
        let mut tree = self.lock();
        tree.record(Call::Chmod(path.to_owned(), mode))?;

        let path = normalize(path);
        let _ = tree.node(&path)?;
        if let Some(node) = tree.nodes.get_mut(&path) {
            node.mode = mode & 0o7777;
        }

        Ok(())
    }

    fn open_read(&self, path: &str) -> ChannelResult<ReadHandle> {
        let mut tree = self.lock();
        tree.record(Call::OpenRead(path.to_owned()))?;

        let node = tree.node(&normalize(path))?;
        if node.is_dir() {
            return Err(ChannelError::new(StatusCode::Failure, "Is a directory"));
        }

        Ok(Box::new(MemoryReader {
            fs: self.clone(),
            path: path.to_owned(),
            data: Cursor::new(node.data.clone()),
        }))
    }

    fn open_write(&self, path: &str) -> ChannelResult<WriteHandle> {
        let mut tree = self.lock();
        tree.record(Call::OpenWrite(path.to_owned()))?;

        let normalized = normalize(path);
        tree.require_parent_dir(&normalized)?;

        match tree.nodes.get_mut(&normalized) {
            Some(node) if node.is_dir() => {
                return Err(ChannelError::new(StatusCode::Failure, "Is a directory"));
            }
            Some(node) => {
                node.data.clear();
                node.mtime = now();
            }
            None => {
                let _ = tree
                    .nodes
                    .insert(normalized, Node::new(FileType::REG, 0o644));
            }
        }

        Ok(Box::new(MemoryWriter {
            fs: self.clone(),
            path: path.to_owned(),
        }))
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<usize> {
        let mut tree = self.lock();
        tree.record(Call::Write(path.to_owned(), data.len()))
            .map_err(io_error)?;

        match tree.nodes.get_mut(&normalize(path)) {
            Some(node) => {
                node.data.extend_from_slice(data);
                node.mtime = now();
                Ok(data.len())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "file removed while open",
            )),
        }
    }

    fn check_read(&self, path: &str, offset: u64) -> io::Result<()> {
        let mut tree = self.lock();
        tree.record(Call::Read(path.to_owned(), offset))
            .map_err(io_error)?;

        match tree.read_failures.get(&normalize(path)) {
            Some((from, err)) if offset >= *from => Err(io_error(err.clone())),
            _ => Ok(()),
        }
    }
}

/// Read handle over a snapshot of the file taken when it was opened.
struct MemoryReader {
    fs: MemoryFs,
    path: String,
    data: Cursor<Vec<u8>>,
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.fs.check_read(&self.path, self.data.position())?;
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

/// Write handle appending straight into the tree.
struct MemoryWriter {
    fs: MemoryFs,
    path: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.fs.write(&self.path, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// [`Transport`] serving a [`MemoryFs`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    fs: MemoryFs,
    password: Option<String>,
    connect_error: Option<ChannelError>,
    channel_error: Option<ChannelError>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            password: None,
            connect_error: None,
            channel_error: None,
        }
    }

    /// Only accepts password authentication with `password`.
    #[must_use]
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Fails every connection attempt with `err`.
    #[must_use]
    pub fn refuse_connections(mut self, err: ChannelError) -> Self {
        self.connect_error = Some(err);
        self
    }

    /// Connects but fails to open the file channel with `err`.
    #[must_use]
    pub fn refuse_channels(mut self, err: ChannelError) -> Self {
        self.channel_error = Some(err);
        self
    }

    #[must_use]
    pub fn fs(&self) -> &MemoryFs {
        &self.fs
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(
        &mut self,
        hostname: &str,
        port: u16,
        username: &str,
        credentials: &Credentials,
    ) -> ChannelResult<Box<dyn Connection>> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }

        if let Some(expected) = &self.password {
            if !matches!(credentials, Credentials::Password(given) if given == expected) {
                return Err(ChannelError::new(
                    StatusCode::PermissionDenied,
                    "authentication failed",
                ));
            }
        }

        debug!("memory transport accepted {username}@{hostname}:{port}");
        Ok(Box::new(MemoryConnection {
            fs: self.fs.clone(),
            channel_error: self.channel_error.clone(),
        }))
    }
}

struct MemoryConnection {
    fs: MemoryFs,
    channel_error: Option<ChannelError>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn open_file_channel(&mut self) -> ChannelResult<Box<dyn FileChannel>> {
        match &self.channel_error {
            Some(err) => Err(err.clone()),
            None => Ok(Box::new(MemoryChannel {
                fs: self.fs.clone(),
            })),
        }
    }

    async fn disconnect(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

struct MemoryChannel {
    fs: MemoryFs,
}

#[async_trait]
impl FileChannel for MemoryChannel {
    async fn stat(&mut self, path: &str) -> ChannelResult<FileAttributes> {
        self.fs.stat(path)
    }

    async fn read_dir(&mut self, path: &str) -> ChannelResult<Vec<(String, FileAttributes)>> {
        self.fs.read_dir(path)
    }

    async fn mkdir(&mut self, path: &str) -> ChannelResult<()> {
        self.fs.mkdir(path)
    }

    async fn unlink(&mut self, path: &str) -> ChannelResult<()> {
        self.fs.unlink(path)
    }

    async fn rmdir(&mut self, path: &str) -> ChannelResult<()> {
        self.fs.rmdir(path)
    }

    async fn rename(&mut self, from: &str, to: &str) -> ChannelResult<()> {
        self.fs.rename(from, to)
    }

    async fn chmod(&mut self, path: &str, mode: u32) -> ChannelResult<()> {
        self.fs.chmod(path, mode)
    }

    async fn open_read(&mut self, path: &str) -> ChannelResult<ReadHandle> {
        self.fs.open_read(path)
    }

    async fn open_write(&mut self, path: &str) -> ChannelResult<WriteHandle> {
        self.fs.open_write(path)
    }

    async fn close(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize, Call, MemoryFs, Op};
    use crate::protocol::{FileType, StatusCode};

    #[test]
    fn paths_are_normalized() {
        assert_eq!(normalize("/a/b/"), "/a/b");
        assert_eq!(normalize("a//b/./c/../d"), "/a/b/d");
        assert_eq!(normalize("."), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn adding_creates_ancestors() {
        let fs = MemoryFs::new();
        let _ = fs.add_file("/upload/deep/file.txt", b"hello");

        assert_eq!(
            fs.paths(),
            vec!["/", "/upload", "/upload/deep", "/upload/deep/file.txt"]
        );
        assert_eq!(fs.read("/upload/deep/file.txt").unwrap(), b"hello");
        assert_eq!(fs.read("/upload/deep"), None);
    }

    #[test]
    fn listing_includes_dot_entries() {
        let fs = MemoryFs::new();
        let _ = fs.add_file("/d/a", b"").add_dir("/d/b");

        let names: Vec<String> = fs
            .read_dir("/d")
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec![".", "..", "a", "b"]);
    }

    #[test]
    fn rename_moves_subtrees() {
        let fs = MemoryFs::new();
        let _ = fs.add_file("/src/x/y", b"1").add_dir("/dst");

        fs.rename("/src", "/dst/moved").unwrap();
        assert!(fs.exists("/dst/moved/x/y"));
        assert!(!fs.exists("/src"));
        assert_eq!(fs.rename("/dst", "/dst/moved/inner").unwrap_err().code, StatusCode::Failure);
    }

    #[test]
    fn rmdir_requires_an_empty_directory() {
        let fs = MemoryFs::new();
        let _ = fs.add_file("/d/a", b"");

        assert_eq!(fs.rmdir("/d").unwrap_err().code, StatusCode::Failure);
        assert_eq!(fs.rmdir("/missing").unwrap_err().code, StatusCode::NoSuchFile);
        fs.unlink("/d/a").unwrap();
        fs.rmdir("/d").unwrap();
    }

    #[test]
    fn injected_failures_are_reported_and_recorded() {
        let fs = MemoryFs::new();
        let _ = fs
            .add_node("/dev/null", FileType::CHR, 0o666)
            .fail(Op::Stat, "/dev/null", StatusCode::PermissionDenied);

        assert_eq!(
            fs.stat("/dev/null").unwrap_err().code,
            StatusCode::PermissionDenied
        );
        assert_eq!(fs.calls(), vec![Call::Stat("/dev/null".to_owned())]);

        fs.clear_failures();
        assert!(fs.stat("/dev/null").is_ok());
    }
}
