//! A counting semaphore for releasing worker threads and waiting for
//! their completion.
//!
//! The original scheduler used POSIX `sem_init`/`sem_post`/`sem_wait`
//! directly, since its worker threads were plain `pthread_t`s sharing the
//! host process's libc. Guest worker threads here are ordinary
//! `std::thread::JoinHandle`s instead, so there is no `sem_t` to bind to;
//! a `Mutex`-and-`Condvar` counting semaphore gives the same wait/post
//! protocol without depending on libc's threading internals.

use std::sync::{Condvar, Mutex};

pub struct CountingSemaphore {
    count: Mutex<u64>,
    condvar: Condvar,
}

impl CountingSemaphore {
    pub fn new(initial: u64) -> Self {
        CountingSemaphore { count: Mutex::new(initial), condvar: Condvar::new() }
    }

    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.condvar.notify_one();
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.condvar.wait(count).unwrap();
        }
        *count -= 1;
    }
}
