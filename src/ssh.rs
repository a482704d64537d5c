//! [`Transport`] over SSH, built on `russh` and the `russh-sftp` client.

use russh::{client, Disconnect};
use russh_keys::key;
use russh_sftp::{
    client::{error::Error as SessionError, SftpSession},
    protocol::FileAttributes as WireAttributes,
};
use std::sync::Arc;

use crate::{
    config::Credentials,
    protocol::{FileAttributes, StatusCode},
    transport::{
        ChannelError, ChannelResult, Connection, FileChannel, ReadHandle, Transport, WriteHandle,
    },
};

impl From<SessionError> for ChannelError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Status(status) => {
                Self::new(StatusCode::from(status.status_code as u32), status.error_message)
            }
            SessionError::Timeout => Self::new(StatusCode::ConnectionLost, "timeout"),
            err => Self::new(StatusCode::Failure, err.to_string()),
        }
    }
}

impl From<russh::Error> for ChannelError {
    fn from(err: russh::Error) -> Self {
        Self::new(StatusCode::NoConnection, err.to_string())
    }
}

fn attributes(wire: &WireAttributes) -> FileAttributes {
    FileAttributes {
        size: wire.size,
        uid: wire.uid,
        gid: wire.gid,
        permissions: wire.permissions,
        atime: wire.atime,
        mtime: wire.mtime,
    }
}

/// Accepts any host key and logs it.
struct AcceptingHandler;

#[async_trait]
impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            "accepting unverified host key {}",
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

/// Connects over SSH and runs the `sftp` subsystem.
///
/// Host keys are not verified.
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    config: Arc<client::Config>,
}

impl SshTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(
        &mut self,
        hostname: &str,
        port: u16,
        username: &str,
        credentials: &Credentials,
    ) -> ChannelResult<Box<dyn Connection>> {
        let mut handle =
            client::connect(self.config.clone(), (hostname, port), AcceptingHandler).await?;

        let authenticated = match credentials {
            Credentials::Password(password) => {
                handle.authenticate_password(username, password).await?
            }
            Credentials::PrivateKey { key, passphrase } => {
                let pair = russh_keys::decode_secret_key(key, passphrase.as_deref())
                    .map_err(|err| ChannelError::new(StatusCode::PermissionDenied, err.to_string()))?;
                handle
                    .authenticate_publickey(username, Arc::new(pair))
                    .await?
            }
        };

        if !authenticated {
            return Err(ChannelError::new(
                StatusCode::PermissionDenied,
                format!("authentication rejected for {username}"),
            ));
        }

        info!("authenticated as {username} on {hostname}:{port}");
        Ok(Box::new(SshConnection { handle }))
    }
}

struct SshConnection {
    handle: client::Handle<AcceptingHandler>,
}

#[async_trait]
impl Connection for SshConnection {
    async fn open_file_channel(&mut self) -> ChannelResult<Box<dyn FileChannel>> {
        let channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let session = SftpSession::new(channel.into_stream()).await?;

        Ok(Box::new(SftpChannel { session }))
    }

    async fn disconnect(&mut self) -> ChannelResult<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

struct SftpChannel {
    session: SftpSession,
}

#[async_trait]
impl FileChannel for SftpChannel {
    async fn stat(&mut self, path: &str) -> ChannelResult<FileAttributes> {
        let metadata = self.session.symlink_metadata(path).await?;
        Ok(attributes(&metadata))
    }

    async fn read_dir(&mut self, path: &str) -> ChannelResult<Vec<(String, FileAttributes)>> {
        Ok(self
            .session
            .read_dir(path)
            .await?
            .map(|entry| (entry.file_name(), attributes(&entry.metadata())))
            .collect())
    }

    async fn mkdir(&mut self, path: &str) -> ChannelResult<()> {
        Ok(self.session.create_dir(path).await?)
    }

    async fn unlink(&mut self, path: &str) -> ChannelResult<()> {
        Ok(self.session.remove_file(path).await?)
    }

    async fn rmdir(&mut self, path: &str) -> ChannelResult<()> {
        Ok(self.session.remove_dir(path).await?)
    }

    async fn rename(&mut self, from: &str, to: &str) -> ChannelResult<()> {
        Ok(self.session.rename(from, to).await?)
    }

    async fn chmod(&mut self, path: &str, mode: u32) -> ChannelResult<()> {
        // only the permissions are sent, anything else set would be applied too
        let attrs = WireAttributes {
            size: None,
            uid: None,
            gid: None,
            permissions: Some(mode),
            atime: None,
            mtime: None,
            ..WireAttributes::default()
        };

        Ok(self.session.set_metadata(path, attrs).await?)
    }

    async fn open_read(&mut self, path: &str) -> ChannelResult<ReadHandle> {
        Ok(Box::new(self.session.open(path).await?))
    }

    async fn open_write(&mut self, path: &str) -> ChannelResult<WriteHandle> {
        Ok(Box::new(self.session.create(path).await?))
    }

    async fn close(&mut self) -> ChannelResult<()> {
        Ok(self.session.close().await?)
    }
}

