//! Walks through the client against a real server.
//!
//! ```text
//! SFTP_HOST=localhost SFTP_USER=root SFTP_PASSWORD=pass cargo run --example client --features ssh
//! ```

use anyhow::Context;
use sftp_fs::{ssh::SshTransport, ConnectOptions, ModeBits, SftpClient, StreamEvent};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let options = ConnectOptions::new(
        env::var("SFTP_HOST").unwrap_or_else(|_| "localhost".to_owned()),
        env::var("SFTP_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(22),
        env::var("SFTP_USER").context("SFTP_USER is not set")?,
    )
    .with_password(env::var("SFTP_PASSWORD").context("SFTP_PASSWORD is not set")?);

    let mut client = SftpClient::new(SshTransport::new());
    let _ = client.connect(&options).await?;

    let root = "./sftp-fs-demo";
    client.create_directory(&format!("{root}/nested/dir"), true).await?;
    client
        .put_file(&format!("{root}/nested/hello.txt"), b"hello from sftp-fs\n")
        .await?;

    let mut stream = client
        .create_write_stream(&format!("{root}/nested/dir/streamed.txt"))
        .await?;
    let mut events = stream.events().context("events already taken")?;
    for line in 0..10 {
        stream.write_chunk(format!("line {line}\n").as_bytes()).await?;
    }
    stream.close().await?;
    while let Some(event) = events.recv().await {
        println!("write stream event: {event:?}");
        if event == StreamEvent::Close {
            break;
        }
    }

    client
        .set_permissions(&format!("{root}/nested/hello.txt"), ModeBits::new(0o600))
        .await?;

    for entry in client.list_detailed(&format!("{root}/nested")).await? {
        println!("{} {:>8} {}", entry.metadata(), entry.metadata().len(), entry.file_name());
    }

    let contents = client.get_file(&format!("{root}/nested/hello.txt")).await?;
    println!("hello.txt: {}", String::from_utf8_lossy(&contents));

    client
        .move_path(&format!("{root}/nested"), &format!("{root}/moved"))
        .await?;
    println!("after move: {:?}", client.list(root).await?);

    client.delete_directory(root, true).await?;
    println!("cleaned up: {}", !client.exists(root).await?);

    client.end().await?;
    Ok(())
}
