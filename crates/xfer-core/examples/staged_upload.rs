// examples/staged_upload.rs
//
// Uploads a batch of chunks into a device-local buffer on the simulated device.
// Every chunk goes through its own staging buffer; the command list keeps all of
// them alive until it is submitted and retired.
// CLI: --chunks N, --chunk-bytes N
// Metrics and transfer traces are printed with features "metrics" / "memtrace".

use std::env;

use xfer_core::sim::{JournalEntry, SimCommandList, SimDevice};
use xfer_core::{CopySource, DestinationOptions, Result, Sequence, copy_source};

#[cfg(feature = "metrics")]
use xfer_core::summary;
#[cfg(feature = "memtrace")]
use xfer_core::flush_csv;

#[derive(Clone, Copy, Debug)]
struct Args {
    chunks: u64,
    chunk_bytes: u64,
}

fn parse_args() -> Args {
    let mut args = Args { chunks: 8, chunk_bytes: 64 << 10 };
    let mut it = env::args().skip(1);
    while let Some(flag) = it.next() {
        let value = it.next().and_then(|v| v.replace('_', "").parse::<u64>().ok());
        match (flag.as_str(), value) {
            ("--chunks", Some(v)) if v > 0 => args.chunks = v,
            ("--chunk-bytes", Some(v)) if v > 0 => args.chunk_bytes = v,
            _ => eprintln!("ignoring argument {flag}"),
        }
    }
    args
}

fn main() -> Result<()> {
    let args = parse_args();
    let device = SimDevice::new();
    let total = args.chunks * args.chunk_bytes;
    let dst = device.device_local_buffer(total);

    let host: Vec<Vec<u8>> = (0..args.chunks)
        .map(|i| vec![(i % 251) as u8; args.chunk_bytes as usize])
        .collect();

    let mut list = device.command_list();
    let sequence = host.iter().enumerate().fold(Sequence::<SimCommandList>::new(), |seq, (i, chunk)| {
        let options = DestinationOptions::default()
            .offset(i as u64 * args.chunk_bytes)
            .size(args.chunk_bytes);
        seq.then(copy_source(chunk).copy_destination(&dst, options))
    });
    sequence.record_into(&mut list)?;
    println!("chunks={} chunk_bytes={} retained={}", args.chunks, args.chunk_bytes, list.retained());

    list.submit()?;
    let released = list.retire();
    println!("released {released} staging buffer(s), live buffers: {}", device.live_buffers());

    let contents = dst.contents();
    let ok = contents
        .chunks(args.chunk_bytes as usize)
        .zip(&host)
        .all(|(a, b)| a == b.as_slice());
    let barriers = device
        .journal()
        .iter()
        .filter(|e| matches!(e, JournalEntry::Barrier { .. }))
        .count();
    println!("barriers={barriers} contents_ok={ok}");

    #[cfg(feature = "metrics")]
    summary();

    #[cfg(feature = "memtrace")]
    if let Err(e) = flush_csv(".") {
        eprintln!("memtrace flush failed: {e}");
    }

    Ok(())
}
