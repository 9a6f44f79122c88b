//! The syscall-number-indexed formatter table.

use crate::error::StraceError;
use crate::formatter::Formatter;

pub const SYSCALL_NUM_MAX: usize = 1024;

pub struct FormatterTable {
    slots: Vec<Option<Formatter>>,
}

impl FormatterTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(SYSCALL_NUM_MAX);
        slots.resize_with(SYSCALL_NUM_MAX, || None);
        FormatterTable { slots }
    }

    pub fn register(&mut self, nr: u32, formatter: Formatter) -> Result<(), StraceError> {
        let slot = self.slots.get_mut(nr as usize).ok_or(StraceError::SyscallNumberOutOfRange {
            nr,
            max: SYSCALL_NUM_MAX as u32,
        })?;
        *slot = Some(formatter);
        Ok(())
    }

    pub fn lookup(&self, nr: u32) -> Option<&Formatter> {
        self.slots.get(nr as usize)?.as_ref()
    }

    /// Formats a call, falling back to a bare numeric rendering for any
    /// syscall number that has no registered formatter.
    pub fn format_call(&self, nr: u32, raw_args: &[u64]) -> String {
        match self.lookup(nr) {
            Some(f) => f.format(raw_args),
            None => format!("syscall_{nr}({})", raw_args.iter().map(|a| format!("{a:#x}")).collect::<Vec<_>>().join(", ")),
        }
    }
}

impl Default for FormatterTable {
    fn default() -> Self {
        Self::new()
    }
}
