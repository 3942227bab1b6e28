use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Prints a running record count and rate to stderr.
pub struct ProgressCounter {
    label: &'static str,
    interval: u64,
    count: AtomicU64,
    started: Instant,
}

impl ProgressCounter {
    pub fn new(label: &'static str, interval: u64) -> Self {
        let counter = Self {
            label,
            interval: interval.max(1),
            count: AtomicU64::new(0),
            started: Instant::now(),
        };
        counter.print(0);
        counter
    }

    pub fn inc(&self, delta: u64) {
        let prev = self.count.fetch_add(delta, Ordering::SeqCst);
        let current = prev + delta;
        // Print if we crossed an interval boundary
        if prev / self.interval < current / self.interval {
            self.print(current);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn finish(&self) {
        self.print(self.count());
        eprintln!();
    }

    fn print(&self, current: u64) {
        let elapsed = self.started.elapsed().as_secs_f64();
        eprint!(
            "\r{}: {} ({:.1}s, {} /s)",
            self.label,
            current,
            elapsed,
            per_second(current, elapsed)
        );
        let _ = std::io::stderr().flush();
    }
}

pub fn per_second(count: u64, elapsed_secs: f64) -> u64 {
    if elapsed_secs <= 0.0 {
        return count;
    }
    (count as f64 / elapsed_secs) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_increments() {
        let progress = ProgressCounter::new("test", 10);
        progress.inc(4);
        progress.inc(7);
        assert_eq!(progress.count(), 11);
    }

    #[test]
    fn rate_handles_zero_elapsed() {
        assert_eq!(per_second(50, 0.0), 50);
        assert_eq!(per_second(50, 2.0), 25);
    }
}
