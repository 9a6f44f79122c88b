//! Compound thread/context identifier used to key control blocks.
//!
//! A PTID packs a coarse execution-context class into bits above the raw
//! pid so that user threads, kernel threads, and the three interrupt
//! contexts (softirq/hardirq/nmi) each get disjoint id spaces even though
//! the kernel recycles pid numbers and interrupts don't have one at all.

const KERNEL_BIAS: u32 = 1 << 16;
const SOFTIRQ_CLASS: u32 = 1 << 8;
const HARDIRQ_CLASS: u32 = 1 << 9;
const NMI_CLASS: u32 = 1 << 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ptid(u32);

impl Ptid {
    /// A PTID for a normal user-space task, identified by its pid.
    pub fn user_task(pid: u32) -> Self {
        Ptid(pid)
    }

    /// A PTID for a task executing in kernel context (syscall, fault, ioctl).
    pub fn kernel_task(pid: u32) -> Self {
        Ptid(pid + KERNEL_BIAS)
    }

    /// A PTID for softirq context on a given CPU.
    pub fn softirq(cpu: u32) -> Self {
        Ptid((SOFTIRQ_CLASS + cpu) << 16)
    }

    /// A PTID for hardirq context on a given CPU.
    pub fn hardirq(cpu: u32) -> Self {
        Ptid((HARDIRQ_CLASS + cpu) << 16)
    }

    /// A PTID for non-maskable-interrupt context on a given CPU.
    pub fn nmi(cpu: u32) -> Self {
        Ptid((NMI_CLASS + cpu) << 16)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        Ptid(raw)
    }

    pub fn is_kernel_task(self) -> bool {
        let class = self.0 >> 16;
        class != 0 && class < SOFTIRQ_CLASS && self.0 >= KERNEL_BIAS
    }

    pub fn is_interrupt_context(self) -> bool {
        let class = self.0 >> 16;
        class >= SOFTIRQ_CLASS
    }
}

impl From<Ptid> for u32 {
    fn from(p: Ptid) -> u32 {
        p.0
    }
}
