// crates/xfer-core/benches/staging_bench.rs
//
// Mapped vs staged host uploads on the simulated device.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use xfer_core::copy_host_to_buffer;
use xfer_core::sim::{SimCommandList, SimDevice};

const SIZES: [u64; 3] = [4 << 10, 256 << 10, 4 << 20];

fn upload_benchmark(c: &mut Criterion) {
    let device = SimDevice::new();
    let mut group = c.benchmark_group("host_upload");

    for &size in &SIZES {
        let payload = vec![0xA5u8; size as usize];
        let mapped = device.host_visible_buffer(size);
        let local = device.device_local_buffer(size);
        group.throughput(Throughput::Bytes(size));

        group.bench_with_input(BenchmarkId::new("mapped", size), &size, |b, &size| {
            b.iter(|| {
                let mut list = device.command_list();
                copy_host_to_buffer::<SimCommandList>(&payload, &mapped, 0, 0, size)
                    .record_into(&mut list)
                    .unwrap();
                list.submit().unwrap();
                device.clear_journal();
                black_box(&mapped);
            });
        });

        group.bench_with_input(BenchmarkId::new("staged", size), &size, |b, &size| {
            b.iter(|| {
                let mut list = device.command_list();
                copy_host_to_buffer::<SimCommandList>(&payload, &local, 0, 0, size)
                    .record_into(&mut list)
                    .unwrap();
                list.submit().unwrap();
                list.retire();
                device.clear_journal();
                black_box(&local);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, upload_benchmark);
criterion_main!(benches);
