use super::{Dir, Record, is_auto_trace_enabled, now_us, trace_log};

/// Open trace span for one transfer. Logged on [`finish`](Self::finish).
#[derive(Debug)]
#[must_use = "a token only records when finished"]
pub struct CopyToken {
    dir: Dir,
    bytes: usize,
    t_start_us: u64,
}

/// Starts tracing a transfer of `bytes` in direction `dir`.
#[inline]
pub fn start(dir: Dir, bytes: usize) -> CopyToken {
    CopyToken { dir, bytes, t_start_us: now_us() }
}

impl CopyToken {
    pub fn finish(self) {
        log_transfer(self.dir, self.bytes, self.t_start_us, now_us());
    }
}

/// Logs a transfer with explicit timestamps, if auto-tracing is on.
pub fn log_transfer(dir: Dir, bytes: usize, t_start_us: u64, t_end_us: u64) {
    if !is_auto_trace_enabled() {
        return;
    }
    trace_log().push(Record { t_start_us, t_end_us, bytes, dir });
}
