use sftp_fs::{
    memory::{MemoryFs, MemoryTransport},
    ConnectOptions, SftpClient, StreamOptions,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn options() -> ConnectOptions {
    ConnectOptions::new("sftp.test", 2222, "tester").with_password("secret")
}

pub async fn connected(fs: &MemoryFs) -> anyhow::Result<SftpClient> {
    connected_with(fs, StreamOptions::default()).await
}

pub async fn connected_with(fs: &MemoryFs, stream: StreamOptions) -> anyhow::Result<SftpClient> {
    init_logger();

    let mut client = SftpClient::new(MemoryTransport::new(fs.clone()).with_password("secret"));
    let _ = client
        .connect(&options().with_stream_options(stream))
        .await?;
    fs.clear_calls();

    Ok(client)
}
