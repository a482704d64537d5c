use bytes::Bytes;
use std::{collections::VecDeque, fmt, future::Future, pin::Pin};

use super::{
    error::{Error, SftpResult},
    fs::{is_self_or_parent, DirEntry, Metadata, ModeBits, ReadDir, ReadStream, WriteStream},
    lifecycle::{Lifecycle, State},
};
use crate::{
    config::{ConnectOptions, Credentials, StreamOptions},
    protocol::FileAttributes,
    transport::{ChannelResult, Connection, FileChannel, Transport},
    utils,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Logs an error on its way out. Missing paths are often expected by the
/// caller and only show up at debug level.
fn fail(err: Error) -> Error {
    if err.is_not_found() {
        debug!("{err}");
    } else {
        error!("{err}");
    }
    err
}

/// High-level SFTP client for manipulating a remote file system.
///
/// Every operation first checks that the client is connected and fails with
/// [`Error::NotConnected`] naming the attempted action otherwise. Methods
/// take `&mut self`: a client has at most one request in flight.
///
/// Tree operations are sequences of separate round trips. They check
/// before they act but cannot guard against concurrent changes made by
/// others, and a failure part way leaves whatever was already done in
/// place.
pub struct SftpClient {
    transport: Box<dyn Transport>,
    lifecycle: Lifecycle,
    connection: Option<Box<dyn Connection>>,
    channel: Option<Box<dyn FileChannel>>,
    stream_options: StreamOptions,
    endpoint: String,
}

impl SftpClient {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Box::new(transport),
            lifecycle: Lifecycle::new(),
            connection: None,
            channel: None,
            stream_options: StreamOptions::default(),
            endpoint: String::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lifecycle.is_connected()
    }

    /// Connects to the server and opens the file channel.
    ///
    /// Not retryable: after a failure the client stays `failed` and a new
    /// client has to be built.
    ///
    /// # Errors
    ///
    /// [`Error::MissingCredentials`] before anything is attempted,
    /// [`Error::InvalidStateTransition`] if the client was used before and
    /// [`Error::ConnectionFailed`] if the transport failed.
    pub async fn connect(&mut self, options: &ConnectOptions) -> SftpResult<&mut Self> {
        let credentials = options.credentials().map_err(fail)?;

        self.lifecycle.transition(State::Connecting).map_err(fail)?;
        self.endpoint = format!("{}:{}", options.hostname, options.port);
        debug!(
            "connecting to SFTP server {} as {}",
            self.endpoint, options.username
        );

        match self.establish(options, &credentials).await {
            Ok((connection, channel)) => {
                self.connection = Some(connection);
                self.channel = Some(channel);
                self.stream_options = options.stream;
                self.lifecycle.transition(State::Connected)?;

                info!("SFTP client connected to {}", self.endpoint);
                Ok(self)
            }
            Err(err) => {
                self.lifecycle.transition(State::Failed)?;

                Err(fail(Error::ConnectionFailed {
                    host: options.hostname.clone(),
                    port: options.port,
                    code: err.code,
                    message: err.message,
                }))
            }
        }
    }

    async fn establish(
        &mut self,
        options: &ConnectOptions,
        credentials: &Credentials,
    ) -> ChannelResult<(Box<dyn Connection>, Box<dyn FileChannel>)> {
        let mut connection = self
            .transport
            .connect(
                &options.hostname,
                options.port,
                &options.username,
                credentials,
            )
            .await?;

        match connection.open_file_channel().await {
            Ok(channel) => Ok((connection, channel)),
            Err(err) => {
                if let Err(e) = connection.disconnect().await {
                    warn!("failed to disconnect after channel error: {e}");
                }
                Err(err)
            }
        }
    }

    /// Closes the file channel and the connection. Every later call fails
    /// with [`Error::NotConnected`].
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] unless connected. Teardown errors are
    /// reported after the client already moved to `ended`.
    pub async fn end(&mut self) -> SftpResult<()> {
        self.lifecycle.require_connected("end")?;
        self.lifecycle.transition(State::Ended)?;

        let closed = match self.channel.take() {
            Some(mut channel) => channel.close().await,
            None => Ok(()),
        };
        let disconnected = match self.connection.take() {
            Some(mut connection) => connection.disconnect().await,
            None => Ok(()),
        };

        info!("SFTP client for {} ended", self.endpoint);

        closed
            .and(disconnected)
            .map_err(|e| fail(Error::remote("end session", self.endpoint.as_str(), e)))
    }

    fn channel(&mut self, action: &'static str) -> SftpResult<&mut (dyn FileChannel + 'static)> {
        self.lifecycle.require_connected(action)?;

        let state = self.lifecycle.state();
        self.channel
            .as_deref_mut()
            .ok_or(Error::NotConnected { action, state })
    }

    /// Stats `path`, naming `action` in errors.
    async fn lookup(&mut self, action: &'static str, path: &str) -> SftpResult<Metadata> {
        let attrs = self
            .channel(action)?
            .stat(path)
            .await
            .map_err(|e| fail(Error::remote(action, path, e)))?;

        debug!("stated '{path}'");
        Metadata::from_attributes(path, &attrs).map_err(fail)
    }

    /// Queries metadata about the remote entry. A symbolic link is reported
    /// as itself.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchPath`] if nothing exists at `path`.
    pub async fn stat(&mut self, path: &str) -> SftpResult<Metadata> {
        self.lookup("stat", path).await
    }

    /// Checks whether something exists at `path`.
    ///
    /// # Errors
    ///
    /// Any error of [`stat`](SftpClient::stat) other than
    /// [`Error::NoSuchPath`].
    pub async fn exists(&mut self, path: &str) -> SftpResult<bool> {
        self.lifecycle.require_connected("exists")?;
        self.exists_for("stat", path).await
    }

    /// Same as [`exists`](SftpClient::exists), naming `action` in errors.
    async fn exists_for(&mut self, action: &'static str, path: &str) -> SftpResult<bool> {
        let exists = match self.lookup(action, path).await {
            Ok(_) => true,
            Err(Error::NoSuchPath { .. }) => false,
            Err(err) => return Err(err),
        };

        debug!("path '{path}' exists: {exists}");
        Ok(exists)
    }

    async fn read_dir_raw(
        &mut self,
        action: &'static str,
        dir: &str,
    ) -> SftpResult<Vec<(String, FileAttributes)>> {
        let mut entries = self
            .channel(action)?
            .read_dir(dir)
            .await
            .map_err(|e| fail(Error::remote_dir(action, dir, e)))?;

        entries.retain(|(name, _)| !is_self_or_parent(name));
        debug!("read directory '{dir}' with {} entries", entries.len());

        Ok(entries)
    }

    /// Lists the names in a directory, without `.` and `..`.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchDirectory`] if `dir` does not exist.
    pub async fn list(&mut self, dir: &str) -> SftpResult<Vec<String>> {
        let entries = self.read_dir_raw("list", dir).await?;
        Ok(entries.into_iter().map(|(name, _)| name).collect())
    }

    /// Lists a directory with the metadata of every entry.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchDirectory`] if `dir` does not exist.
    pub async fn list_detailed(&mut self, dir: &str) -> SftpResult<ReadDir> {
        let entries = self
            .read_dir_raw("list", dir)
            .await?
            .into_iter()
            .map(|(name, attrs)| {
                Metadata::from_attributes(&utils::join(dir, &name), &attrs)
                    .map(|metadata| DirEntry::new(name, metadata))
            })
            .collect::<SftpResult<VecDeque<_>>>()
            .map_err(fail)?;

        Ok(ReadDir { entries })
    }

    /// Creates a directory. With `recursive` missing ancestors are created
    /// first, outermost first.
    ///
    /// # Errors
    ///
    /// [`Error::PathAlreadyExists`] if `path` exists and
    /// [`Error::MissingParent`] if its parent is missing and `recursive` is
    /// not set.
    pub async fn create_directory(&mut self, path: &str, recursive: bool) -> SftpResult<()> {
        self.lifecycle.require_connected("create directory")?;
        self.create_directory_at(path.to_owned(), recursive).await
    }

    fn create_directory_at(&mut self, path: String, recursive: bool) -> BoxFuture<'_, SftpResult<()>> {
        Box::pin(async move {
            const ACTION: &str = "create directory";

            if self.exists_for(ACTION, &path).await? {
                return Err(fail(Error::PathAlreadyExists { path }));
            }

            let parent = utils::parent(&path);
            if !self.exists_for(ACTION, &parent).await? {
                // the root is its own parent, nothing left to create
                if !recursive || parent == path {
                    return Err(fail(Error::MissingParent { path, parent }));
                }

                self.create_directory_at(parent, recursive).await?;
            }

            self.channel(ACTION)?
                .mkdir(&path)
                .await
                .map_err(|e| fail(Error::remote(ACTION, path.as_str(), e)))?;

            info!("created directory '{path}'");
            Ok(())
        })
    }

    /// Removes a directory. With `recursive` its contents are removed first,
    /// one entry after the other in listing order.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchPath`], [`Error::NotADirectory`], and
    /// [`Error::DirectoryNotEmpty`] if it has entries and `recursive` is not
    /// set. Errors removing a child are returned as is.
    pub async fn delete_directory(&mut self, path: &str, recursive: bool) -> SftpResult<()> {
        self.lifecycle.require_connected("delete directory")?;
        self.delete_directory_at(path.to_owned(), recursive).await
    }

    fn delete_directory_at(&mut self, path: String, recursive: bool) -> BoxFuture<'_, SftpResult<()>> {
        Box::pin(async move {
            const ACTION: &str = "delete directory";

            if !self.lookup(ACTION, &path).await?.is_dir() {
                return Err(fail(Error::NotADirectory {
                    action: ACTION,
                    path,
                }));
            }

            let entries = self.list_detailed(&path).await?;
            if !entries.is_empty() && !recursive {
                return Err(fail(Error::DirectoryNotEmpty { path }));
            }

            for entry in entries {
                let child = utils::join(&path, entry.file_name());
                if entry.metadata().is_dir() {
                    self.delete_directory_at(child, recursive).await?;
                } else {
                    self.delete_file(&child).await?;
                }
            }

            self.channel(ACTION)?
                .rmdir(&path)
                .await
                .map_err(|e| fail(Error::remote(ACTION, path.as_str(), e)))?;

            info!("deleted directory '{path}'");
            Ok(())
        })
    }

    /// Removes a regular file or a symbolic link.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchPath`], [`Error::IsADirectory`] and
    /// [`Error::NotARegularFileOrLink`] for devices, FIFOs and sockets.
    pub async fn delete_file(&mut self, path: &str) -> SftpResult<()> {
        const ACTION: &str = "delete file";

        let metadata = self.lookup(ACTION, path).await?;
        if metadata.is_dir() {
            return Err(fail(Error::IsADirectory {
                path: path.to_owned(),
            }));
        }
        if !metadata.is_file() && !metadata.is_symlink() {
            return Err(fail(Error::NotARegularFileOrLink {
                path: path.to_owned(),
            }));
        }

        self.channel(ACTION)?
            .unlink(path)
            .await
            .map_err(|e| fail(Error::remote(ACTION, path, e)))?;

        info!("deleted file '{path}'");
        Ok(())
    }

    /// Moves a file or directory. An existing target is never overwritten.
    ///
    /// # Errors
    ///
    /// [`Error::SourceNotFound`] and [`Error::TargetAlreadyExists`].
    pub async fn move_path(&mut self, from: &str, to: &str) -> SftpResult<()> {
        const ACTION: &str = "move";
        self.lifecycle.require_connected(ACTION)?;

        if !self.exists_for(ACTION, from).await? {
            return Err(fail(Error::SourceNotFound {
                from: from.to_owned(),
                to: to.to_owned(),
            }));
        }

        if self.exists_for(ACTION, to).await? {
            return Err(fail(Error::TargetAlreadyExists {
                from: from.to_owned(),
                to: to.to_owned(),
            }));
        }

        self.channel(ACTION)?
            .rename(from, to)
            .await
            .map_err(|e| fail(Error::remote(ACTION, from, e)))?;

        info!("moved '{from}' to '{to}'");
        Ok(())
    }

    /// Replaces the permission bits of `path` with `mode`.
    ///
    /// # Errors
    ///
    /// [`Error::TargetNotFound`] if `path` does not exist.
    pub async fn set_permissions(&mut self, path: &str, mode: ModeBits) -> SftpResult<()> {
        const ACTION: &str = "set permissions on";
        self.lifecycle.require_connected(ACTION)?;

        if !self.exists_for(ACTION, path).await? {
            return Err(fail(Error::TargetNotFound {
                path: path.to_owned(),
            }));
        }

        self.channel(ACTION)?
            .chmod(path, mode.mode())
            .await
            .map_err(|e| fail(Error::remote(ACTION, path, e)))?;

        info!("set permissions on '{path}' to {mode}");
        Ok(())
    }

    /// Opens a stream over the contents of a remote file.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchPath`] if the file does not exist, checked before the
    /// stream is opened.
    pub async fn create_read_stream(&mut self, path: &str) -> SftpResult<ReadStream> {
        const ACTION: &str = "create read stream for";

        let _ = self.lookup(ACTION, path).await?;
        let handle = self
            .channel(ACTION)?
            .open_read(path)
            .await
            .map_err(|e| fail(Error::remote(ACTION, path, e)))?;

        info!("created read stream for file '{path}'");
        Ok(ReadStream::new(
            path.to_owned(),
            handle,
            self.stream_options.read_chunk_size,
        ))
    }

    /// Opens a stream writing a remote file, creating or truncating it.
    ///
    /// # Errors
    ///
    /// The transport's error opening the file.
    pub async fn create_write_stream(&mut self, path: &str) -> SftpResult<WriteStream> {
        const ACTION: &str = "create write stream for";

        let handle = self
            .channel(ACTION)?
            .open_write(path)
            .await
            .map_err(|e| fail(Error::remote(ACTION, path, e)))?;

        info!("created write stream for file '{path}'");
        Ok(WriteStream::new(
            path.to_owned(),
            handle,
            self.stream_options.write_high_water_mark,
        ))
    }

    /// Reads the whole contents of a remote file.
    ///
    /// # Errors
    ///
    /// As [`create_read_stream`](SftpClient::create_read_stream), or the first
    /// error while reading.
    pub async fn get_file(&mut self, path: &str) -> SftpResult<Bytes> {
        self.lifecycle.require_connected("get file")?;

        let data = self.create_read_stream(path).await?.collect().await?;

        info!("downloaded file '{path}' with {} bytes", data.len());
        Ok(data)
    }

    /// Writes `data` as the contents of a remote file and waits until the
    /// file is closed.
    ///
    /// # Errors
    ///
    /// As [`create_write_stream`](SftpClient::create_write_stream), or the
    /// first error while writing.
    pub async fn put_file(&mut self, path: &str, data: &[u8]) -> SftpResult<()> {
        self.lifecycle.require_connected("put file")?;

        let mut stream = self.create_write_stream(path).await?;
        stream.write_chunk(data).await?;
        stream.close().await?;

        info!("wrote file '{path}' with {} bytes", data.len());
        Ok(())
    }
}

impl fmt::Debug for SftpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpClient")
            .field("state", &self.lifecycle.state())
            .field("endpoint", &self.endpoint)
            .field("stream_options", &self.stream_options)
            .finish_non_exhaustive()
    }
}
