//! Binary semaphore closing each async render frame.

use parking_lot::{Condvar, Mutex};

/// Binary semaphore the render worker releases when traversal is done.
///
/// Starts unavailable. The tick thread blocks in [`acquire`](Self::acquire)
/// until the worker calls [`release`](Self::release). There is no timeout on
/// the blocking path: a worker that never finishes stalls the frame loop.
#[derive(Debug, Default)]
pub struct FrameSemaphore {
    available: Mutex<bool>,
    condvar: Condvar,
}

impl FrameSemaphore {
    /// Creates an unavailable semaphore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the semaphore available and wakes the waiter.
    ///
    /// Releasing an already available semaphore keeps it at one.
    pub fn release(&self) {
        let mut available = self.available.lock();
        *available = true;
        self.condvar.notify_one();
    }

    /// Blocks until available, then takes it.
    pub fn acquire(&self) {
        let mut available = self.available.lock();
        while !*available {
            self.condvar.wait(&mut available);
        }
        *available = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Spawns a thread blocked in `acquire`; the flag flips once it returns.
    fn spawn_waiter(sem: &Arc<FrameSemaphore>) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
        let acquired = Arc::new(AtomicBool::new(false));
        let (sem, flag) = (Arc::clone(sem), Arc::clone(&acquired));
        let handle = thread::spawn(move || {
            sem.acquire();
            flag.store(true, Ordering::Release);
        });
        (acquired, handle)
    }

    #[test]
    fn test_starts_unavailable() {
        let sem = Arc::new(FrameSemaphore::new());
        let (acquired, handle) = spawn_waiter(&sem);

        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::Acquire));

        sem.release();
        handle.join().unwrap();
        assert!(acquired.load(Ordering::Acquire));
    }

    #[test]
    fn test_release_is_binary() {
        let sem = Arc::new(FrameSemaphore::new());
        sem.release();
        sem.release();
        sem.acquire();

        // The second release did not count
        let (acquired, handle) = spawn_waiter(&sem);
        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::Acquire));

        sem.release();
        handle.join().unwrap();
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let sem = Arc::new(FrameSemaphore::new());
        let worker_sem = Arc::clone(&sem);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            worker_sem.release();
        });

        sem.acquire();
        handle.join().unwrap();
    }
}
