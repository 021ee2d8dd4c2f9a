#![cfg(feature = "metrics")]

use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

// raw latencies per planner operation

static TIMES: Lazy<Mutex<Vec<(&'static str, u128)>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Call at the end of an operation: `record("copy_host_to_buffer", t0);`
pub fn record(name: &'static str, start: Instant) {
    let dur = start.elapsed().as_micros();
    TIMES.lock().unwrap_or_else(PoisonError::into_inner).push((name, dur));
}

// staging allocations and mapped writes

pub static STAGING_ALLOCS: AtomicUsize = AtomicUsize::new(0);
pub static STAGING_BYTES: AtomicUsize = AtomicUsize::new(0);
pub static MAPPED_WRITES: AtomicUsize = AtomicUsize::new(0);
pub static MAPPED_BYTES: AtomicUsize = AtomicUsize::new(0);

pub fn count_staging_alloc(bytes: usize) {
    STAGING_ALLOCS.fetch_add(1, Ordering::Relaxed);
    STAGING_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub fn count_mapped_write(bytes: usize) {
    MAPPED_WRITES.fetch_add(1, Ordering::Relaxed);
    MAPPED_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

/// Latency statistics of one operation, in microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latency {
    pub name: &'static str,
    pub count: usize,
    pub mean_us: u128,
    pub p95_us: u128,
}

/// Drains recorded latencies and groups them by operation name, sorted by name.
pub fn drain_latencies() -> Vec<Latency> {
    let mut map: HashMap<&'static str, Vec<u128>> = HashMap::new();
    {
        let mut times = TIMES.lock().unwrap_or_else(PoisonError::into_inner);
        for (name, us) in times.drain(..) {
            map.entry(name).or_default().push(us);
        }
    }

    let mut out: Vec<Latency> = map
        .into_iter()
        .map(|(name, mut v)| {
            v.sort_unstable();
            let mean_us = v.iter().sum::<u128>() / v.len() as u128;
            let p95_us = v[((v.len() * 95) / 100).saturating_sub(1)];
            Latency { name, count: v.len(), mean_us, p95_us }
        })
        .collect();
    out.sort_by_key(|l| l.name);
    out
}

pub fn summary() {
    println!("── metrics summary ──");
    for l in drain_latencies() {
        println!("{:<22} n={:<6} mean={:>5} µs   p95={:>5} µs", l.name, l.count, l.mean_us, l.p95_us);
    }

    let allocs = STAGING_ALLOCS.load(Ordering::Relaxed);
    let staged = STAGING_BYTES.load(Ordering::Relaxed);
    let writes = MAPPED_WRITES.load(Ordering::Relaxed);
    let mapped = MAPPED_BYTES.load(Ordering::Relaxed);
    println!("staging buffers: {}   ({} KiB)", allocs, staged / 1024);
    println!("mapped writes:   {}   ({} KiB)", writes, mapped / 1024);
}
