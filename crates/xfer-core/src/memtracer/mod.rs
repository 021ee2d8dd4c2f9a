#![cfg(feature = "memtrace")]

//! Transfer tracing utilities
//!
//! Spans are taken on the host while commands are recorded. `H2D` covers the
//! mapped write itself. `H2DStaged` and `D2D` end once the device copy is
//! recorded, so they measure recording cost and say nothing about when the
//! device executes the copy.

mod copytoken;

pub use copytoken::{CopyToken, log_transfer, start};

use once_cell::sync::Lazy;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

/// Transfer direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dir {
    /// Host write through a mapping.
    H2D,
    /// Host upload through a staging buffer, from allocation until the device
    /// copy is recorded.
    H2DStaged,
    /// Recording of a device-side buffer copy (not its execution).
    D2D,
}

impl Dir {
    pub fn as_str(self) -> &'static str {
        match self {
            Dir::H2D => "H2D",
            Dir::H2DStaged => "H2D-staged",
            Dir::D2D => "D2D",
        }
    }
}

/// Global start time reference
pub static T0: Lazy<Instant> = Lazy::new(Instant::now);

/// Auto-trace enable flag
pub static AUTO_TRACE: AtomicBool = AtomicBool::new(true);

#[inline]
pub fn enable_auto_trace() {
    AUTO_TRACE.store(true, Ordering::Relaxed);
}

#[inline]
pub fn disable_auto_trace() {
    AUTO_TRACE.store(false, Ordering::Relaxed);
}

#[inline]
pub fn is_auto_trace_enabled() -> bool {
    AUTO_TRACE.load(Ordering::Relaxed)
}

/// Log record
#[derive(Debug, Clone)]
pub struct Record {
    pub t_start_us: u64,
    pub t_end_us: u64,
    pub bytes: usize,
    pub dir: Dir,
}

/// Global log storage
pub static LOG: Lazy<Mutex<Vec<Record>>> = Lazy::new(|| Mutex::new(Vec::with_capacity(4096)));

pub(crate) fn trace_log() -> MutexGuard<'static, Vec<Record>> {
    LOG.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Copy of everything traced so far.
pub fn records() -> Vec<Record> {
    trace_log().clone()
}

/// Writes `memtrace.csv` and `memtrace_summary.txt` into `dir`.
///
/// With `memtrace_full`, also `memtrace_events.txt` with one line per event.
pub fn flush_csv(dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    let log = trace_log();

    let mut f = BufWriter::new(File::create(dir.join("memtrace.csv"))?);
    writeln!(f, "t_start_us,t_end_us,bytes,dir")?;
    for r in log.iter() {
        writeln!(f, "{},{},{},{}", r.t_start_us, r.t_end_us, r.bytes, r.dir.as_str())?;
    }
    f.flush()?;

    #[cfg(feature = "memtrace_full")]
    {
        let mut ff = BufWriter::new(File::create(dir.join("memtrace_events.txt"))?);
        for (i, r) in log.iter().enumerate() {
            writeln!(
                ff,
                "#{i:<6} {:<10} {:>10} B  {:>8} µs",
                r.dir.as_str(),
                r.bytes,
                r.t_end_us.saturating_sub(r.t_start_us)
            )?;
        }
        ff.flush()?;
    }

    let bytes_of = |dir: Dir| -> u64 { log.iter().filter(|r| r.dir == dir).map(|r| r.bytes as u64).sum() };
    let busy_us: u64 = log.iter().map(|r| r.t_end_us.saturating_sub(r.t_start_us)).sum();

    let mut fs = File::create(dir.join("memtrace_summary.txt"))?;
    writeln!(fs, "events_total: {}", log.len())?;
    writeln!(fs, "busy_total_us: {}", busy_us)?;
    writeln!(fs, "bytes_h2d_mapped: {}", bytes_of(Dir::H2D))?;
    writeln!(fs, "bytes_h2d_staged: {}", bytes_of(Dir::H2DStaged))?;
    writeln!(fs, "bytes_d2d: {}", bytes_of(Dir::D2D))?;
    Ok(())
}

/// Reset all logs
pub fn reset() {
    trace_log().clear();
}

/// RAII scope for temporarily changing trace state
#[derive(Debug)]
pub struct TracingScope {
    prev: bool,
}

impl TracingScope {
    #[inline]
    pub fn new(enable: bool) -> Self {
        let prev = AUTO_TRACE.swap(enable, Ordering::Relaxed);
        TracingScope { prev }
    }

    #[inline]
    pub fn enabled() -> Self {
        Self::new(true)
    }

    #[inline]
    pub fn disabled() -> Self {
        Self::new(false)
    }
}

impl Drop for TracingScope {
    fn drop(&mut self) {
        AUTO_TRACE.store(self.prev, Ordering::Relaxed);
    }
}

/// Current time in microseconds since T0
#[inline]
pub fn now_us() -> u64 {
    Instant::now().duration_since(*T0).as_micros() as u64
}
