use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sftp_fs::{
    memory::{MemoryFs, MemoryTransport},
    ConnectOptions, SftpClient, StreamOptions,
};
use tokio::runtime::Runtime;

async fn upload(fs: &MemoryFs, data: &[u8], stream: StreamOptions) {
    let mut client = SftpClient::new(MemoryTransport::new(fs.clone()));
    let options = ConnectOptions::new("localhost", 22, "bench")
        .with_password("bench")
        .with_stream_options(stream);

    let _ = client.connect(&options).await.unwrap();
    client.put_file("/upload/data.bin", data).await.unwrap();
    client.end().await.unwrap();
}

fn put_file(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let fs = MemoryFs::new();
    let _ = fs.add_dir("/upload");

    let mut group = c.benchmark_group("put_file");
    for size in [4 * 1024, 256 * 1024, 4 * 1024 * 1024] {
        let data = vec![0x5a; size];
        group.throughput(Throughput::Bytes(size as u64));

        for high_water_mark in [4 * 1024, 65535] {
            let stream = StreamOptions {
                write_high_water_mark: high_water_mark,
                ..StreamOptions::default()
            };

            group.bench_with_input(
                BenchmarkId::new(format!("hwm_{high_water_mark}"), size),
                &data,
                |b, data| b.to_async(&rt).iter(|| upload(&fs, data, stream)),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, put_file);
criterion_main!(benches);
