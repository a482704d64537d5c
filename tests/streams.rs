mod common;

use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::timeout,
};

use sftp_fs::{
    memory::{Call, MemoryFs, Op},
    protocol::StatusCode,
    Error, State, StreamEvent, StreamOptions,
};

fn small_streams() -> StreamOptions {
    StreamOptions {
        read_chunk_size: 4,
        write_high_water_mark: 4,
    }
}

fn writes(fs: &MemoryFs) -> Vec<usize> {
    fs.calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Write(_, len) => Some(len),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn put_then_get() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let _ = fs.add_dir("/upload");
    let mut client = common::connected(&fs).await?;

    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    client.put_file("/upload/blob.bin", &data).await?;

    assert_eq!(fs.read("/upload/blob.bin").unwrap(), data);
    assert_eq!(client.get_file("/upload/blob.bin").await?, data);

    // existing files are truncated
    client.put_file("/upload/blob.bin", b"short").await?;
    assert_eq!(client.get_file("/upload/blob.bin").await?, &b"short"[..]);

    Ok(())
}

#[tokio::test]
async fn read_stream_delivers_bounded_chunks() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let _ = fs.add_file("/f", b"0123456789");
    let mut client = common::connected_with(&fs, small_streams()).await?;

    let mut stream = client.create_read_stream("/f").await?;
    assert_eq!(stream.path(), "/f");

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next_chunk().await? {
        chunks.push(chunk);
    }

    assert_eq!(chunks, vec![&b"0123"[..], &b"4567"[..], &b"89"[..]]);
    assert_eq!(stream.position(), 10);
    assert!(stream.is_ended());
    assert_eq!(stream.next_chunk().await?, None);

    Ok(())
}

#[tokio::test]
async fn read_stream_checks_the_path_first() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let mut client = common::connected(&fs).await?;

    assert_eq!(
        client.create_read_stream("/missing").await.unwrap_err(),
        Error::NoSuchPath {
            action: "create read stream for",
            path: "/missing".to_owned()
        }
    );
    assert_eq!(fs.calls(), vec![Call::Stat("/missing".to_owned())]);

    Ok(())
}

#[tokio::test]
async fn paused_read_stream_holds_its_position() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let _ = fs.add_file("/f", b"0123456789");
    let mut client = common::connected_with(&fs, small_streams()).await?;

    let mut stream = client.create_read_stream("/f").await?;
    stream.pause();
    assert!(stream.is_paused());
    assert!(timeout(Duration::from_millis(50), stream.next_chunk())
        .await
        .is_err());
    assert_eq!(stream.position(), 0);

    stream.resume();
    assert_eq!(stream.next_chunk().await?.unwrap(), &b"0123"[..]);

    // resumed from another task while a read is waiting
    let handle = stream.pause_handle();
    handle.pause();
    let resumer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.resume();
    });

    assert_eq!(stream.next_chunk().await?.unwrap(), &b"4567"[..]);
    resumer.await?;

    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest).await?;
    assert_eq!(rest, b"89");

    Ok(())
}

#[tokio::test]
async fn write_stream_applies_backpressure() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let mut client = common::connected_with(&fs, small_streams()).await?;

    let mut stream = client.create_write_stream("/out").await?;
    let mut events = stream.events().unwrap();
    assert!(stream.events().is_none());

    stream.write_chunk(b"0123456789").await?;
    assert_eq!(writes(&fs), vec![4, 4]);
    assert_eq!(stream.written(), 8);
    assert_eq!(stream.buffered(), 2);
    assert_eq!(fs.read("/out").unwrap(), b"01234567");

    stream.close().await?;
    assert!(stream.is_closed());
    assert_eq!(writes(&fs), vec![4, 4, 2]);
    assert_eq!(fs.read("/out").unwrap(), b"0123456789");

    assert_eq!(events.recv().await, Some(StreamEvent::Finish));
    assert_eq!(events.recv().await, Some(StreamEvent::Close));

    Ok(())
}

#[tokio::test]
async fn write_stream_works_as_async_write() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let mut client = common::connected(&fs).await?;

    let mut stream = client.create_write_stream("/log.txt").await?;
    stream.write_all(b"line 1\n").await?;
    stream.write_all(b"line 2\n").await?;
    stream.shutdown().await?;

    assert_eq!(fs.read("/log.txt").unwrap(), b"line 1\nline 2\n");

    Ok(())
}

#[tokio::test]
async fn aborted_write_stream_reports_error_then_close() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let mut client = common::connected(&fs).await?;

    let mut stream = client.create_write_stream("/partial").await?;
    let mut events = stream.events().unwrap();
    stream.write_chunk(b"never sent").await?;

    let reason = Error::NotConnected {
        action: "put file",
        state: State::Ended,
    };
    stream.abort(reason.clone());

    assert!(stream.is_closed());
    assert_eq!(stream.buffered(), 0);
    assert_eq!(events.recv().await, Some(StreamEvent::Error(reason.clone())));
    assert_eq!(events.recv().await, Some(StreamEvent::Close));
    assert!(events.try_recv().is_err());

    assert_eq!(stream.write_chunk(b"more").await.unwrap_err(), reason);
    assert!(writes(&fs).is_empty());

    Ok(())
}

#[tokio::test]
async fn write_errors_name_the_file() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let _ = fs.fail(Op::Write, "/locked", StatusCode::PermissionDenied);
    let mut client = common::connected(&fs).await?;

    let mut stream = client.create_write_stream("/locked").await?;
    let mut events = stream.events().unwrap();
    stream.write_chunk(b"data").await?;

    let err = stream.close().await.unwrap_err();
    assert!(matches!(
        err,
        Error::RemoteOperationFailed {
            action: "write file",
            ref path,
            code: StatusCode::PermissionDenied,
            ..
        } if path == "/locked"
    ));
    assert_eq!(events.recv().await, Some(StreamEvent::Error(err)));
    assert_eq!(events.recv().await, Some(StreamEvent::Close));

    assert!(matches!(
        client.put_file("/locked", b"again").await,
        Err(Error::RemoteOperationFailed {
            code: StatusCode::PermissionDenied,
            ..
        })
    ));

    Ok(())
}

#[tokio::test]
async fn write_stream_needs_an_existing_parent() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let mut client = common::connected(&fs).await?;

    assert_eq!(
        client.create_write_stream("/nope/file").await.unwrap_err(),
        Error::NoSuchPath {
            action: "create write stream for",
            path: "/nope/file".to_owned()
        }
    );
    assert!(matches!(
        client.get_file("/nope/file").await,
        Err(Error::NoSuchPath { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn read_errors_part_way_name_the_file() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let _ = fs
        .add_file("/big", b"0123456789")
        .fail_read_at("/big", 4, StatusCode::PermissionDenied);
    let mut client = common::connected_with(&fs, small_streams()).await?;

    let mut stream = client.create_read_stream("/big").await?;
    assert_eq!(stream.next_chunk().await?.unwrap(), &b"0123"[..]);

    let err = stream.next_chunk().await.unwrap_err();
    assert!(matches!(
        err,
        Error::RemoteOperationFailed {
            action: "read file",
            ref path,
            code: StatusCode::PermissionDenied,
            ..
        } if path == "/big"
    ));
    assert_eq!(stream.position(), 4);

    assert_eq!(client.get_file("/big").await.unwrap_err(), err);

    fs.clear_failures();
    assert_eq!(client.get_file("/big").await?, &b"0123456789"[..]);

    Ok(())
}

#[tokio::test]
async fn failing_reads_from_the_start() -> anyhow::Result<()> {
    let fs = MemoryFs::new();
    let _ = fs
        .add_file("/f", b"data")
        .fail(Op::Read, "/f", StatusCode::Failure);
    let mut client = common::connected(&fs).await?;

    assert!(matches!(
        client.get_file("/f").await,
        Err(Error::RemoteOperationFailed {
            action: "read file",
            code: StatusCode::Failure,
            ..
        })
    ));
    assert!(fs
        .calls()
        .contains(&Call::Read("/f".to_owned(), 0)));

    Ok(())
}
