//! The console ledger: a plain append-only text log of formatted syscall
//! lines, guarded by a true spinlock.
//!
//! Strace output is produced from contexts (interrupt handlers, the guest
//! kernel module) where blocking on an OS mutex is not an option, so this
//! uses `spin::Mutex` rather than `std::sync::Mutex` — the same reason the
//! original guarded its console buffer with a `pthread_spinlock_t` instead
//! of a blocking lock.

use spin::Mutex;

/// A formatted syscall line is expected to fit in the same fixed-size
/// `msg` buffer the original pretty-printer wrote into; a printer that
/// overruns it is a formatter bug, not a recoverable condition.
pub const MSG_LINE_LIMIT: usize = 1024;

pub struct ConsoleLedger {
    count: Mutex<u64>,
    lines: Mutex<Vec<String>>,
}

impl ConsoleLedger {
    pub fn new() -> Self {
        ConsoleLedger { count: Mutex::new(0), lines: Mutex::new(Vec::new()) }
    }

    pub fn record(&self, line: String) {
        assert!(
            line.len() <= MSG_LINE_LIMIT,
            "strace line of {} bytes exceeds the {}-byte msg buffer",
            line.len(),
            MSG_LINE_LIMIT
        );
        *self.count.lock() += 1;
        self.lines.lock().push(line);
    }

    pub fn entry_count(&self) -> u64 {
        *self.count.lock()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Default for ConsoleLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn record_appends_and_counts() {
        let ledger = ConsoleLedger::new();
        ledger.record("a".to_string());
        ledger.record("b".to_string());
        assert_eq!(ledger.entry_count(), 2);
        assert_eq!(ledger.snapshot(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn concurrent_records_are_all_retained() {
        let ledger = Arc::new(ConsoleLedger::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let ledger = Arc::clone(&ledger);
            handles.push(thread::spawn(move || ledger.record(format!("line-{i}"))));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.entry_count(), 50);
        assert_eq!(ledger.snapshot().len(), 50);
    }

    #[test]
    #[should_panic(expected = "exceeds the 1024-byte msg buffer")]
    fn line_over_the_limit_is_fatal() {
        let ledger = ConsoleLedger::new();
        ledger.record("x".repeat(MSG_LINE_LIMIT + 1));
    }
}
