//! Rendezvous between memory accesses and memory growth.
//!
//! Accesses announce themselves in `active_ops`; a grow raises `growing`.
//! A new access waits while `growing` is set, and a grow waits until
//! `active_ops` drains to zero, so no access ever runs while the buffer is
//! being replaced. Accesses do not exclude one another.
//!
//! Waiting spins briefly and then parks on a condition variable. Every
//! notification is sent with the mutex held, so a waiter that re-checked its
//! condition under the mutex cannot miss the wake-up.
//!
//! A thread must not grow while it holds an [`OperationGuard`], and should
//! not take a second guard while holding one: either deadlocks against a
//! concurrent grow.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

const SPIN_LIMIT: u32 = 64;

#[derive(Debug, Default)]
pub struct OperationGate {
    growing: AtomicBool,
    active_ops: AtomicUsize,
    lock: Mutex<()>,
    changed: Condvar,
}

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no grow is in flight, then register an access.
    pub fn enter(&self) -> OperationGuard<'_> {
        loop {
            self.wait_while(|| self.growing.load(Ordering::SeqCst));
            self.active_ops.fetch_add(1, Ordering::SeqCst);
            if !self.growing.load(Ordering::SeqCst) {
                return OperationGuard { gate: self };
            }
            // A grow raised the flag between our check and our increment.
            self.leave();
        }
    }

    /// Block until this thread owns the flag and every access has left.
    pub fn exclusive(&self) -> GrowGuard<'_> {
        while self
            .growing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.wait_while(|| self.growing.load(Ordering::SeqCst));
        }
        self.wait_while(|| self.active_ops.load(Ordering::SeqCst) != 0);
        GrowGuard { gate: self }
    }

    pub fn active_ops(&self) -> usize {
        self.active_ops.load(Ordering::SeqCst)
    }

    pub fn is_growing(&self) -> bool {
        self.growing.load(Ordering::SeqCst)
    }

    fn leave(&self) {
        let previous = self.active_ops.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.growing.load(Ordering::SeqCst) {
            self.notify();
        }
    }

    fn wait_while(&self, condition: impl Fn() -> bool) {
        for _ in 0..SPIN_LIMIT {
            if !condition() {
                return;
            }
            std::hint::spin_loop();
        }

        let mut guard = self.lock.lock();
        while condition() {
            self.changed.wait(&mut guard);
        }
    }

    fn notify(&self) {
        let _guard = self.lock.lock();
        self.changed.notify_all();
    }
}

/// An access in progress. Dropping it lets a waiting grow proceed.
#[derive(Debug)]
pub struct OperationGuard<'g> {
    gate: &'g OperationGate,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

/// A grow in progress. Dropping it clears the flag and wakes waiters.
#[derive(Debug)]
pub struct GrowGuard<'g> {
    gate: &'g OperationGate,
}

impl Drop for GrowGuard<'_> {
    fn drop(&mut self) {
        self.gate.growing.store(false, Ordering::SeqCst);
        self.gate.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guards_count_and_release() {
        let gate = OperationGate::new();
        let a = gate.enter();
        let b = gate.enter();
        assert_eq!(gate.active_ops(), 2);
        drop(a);
        assert_eq!(gate.active_ops(), 1);
        drop(b);
        assert_eq!(gate.active_ops(), 0);

        let grow = gate.exclusive();
        assert!(gate.is_growing());
        drop(grow);
        assert!(!gate.is_growing());
    }

    #[test]
    fn test_grow_waits_for_active_ops() {
        let gate = Arc::new(OperationGate::new());
        let released = Arc::new(AtomicBool::new(false));

        let op = gate.enter();
        let grower = {
            let gate = Arc::clone(&gate);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let _grow = gate.exclusive();
                assert!(released.load(Ordering::SeqCst), "grow ran while an access was live");
            })
        };

        thread::sleep(Duration::from_millis(50));
        released.store(true, Ordering::SeqCst);
        drop(op);
        grower.join().unwrap();
        assert!(!gate.is_growing());
    }

    #[test]
    fn test_enter_waits_for_grow() {
        let gate = Arc::new(OperationGate::new());
        let finished = Arc::new(AtomicBool::new(false));

        let grow = gate.exclusive();
        let accessor = {
            let gate = Arc::clone(&gate);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                let _op = gate.enter();
                assert!(finished.load(Ordering::SeqCst), "access ran during a grow");
            })
        };

        thread::sleep(Duration::from_millis(50));
        finished.store(true, Ordering::SeqCst);
        drop(grow);
        accessor.join().unwrap();
        assert_eq!(gate.active_ops(), 0);
    }

    #[test]
    fn test_one_grow_at_a_time() {
        let gate = Arc::new(OperationGate::new());
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _grow = gate.exclusive();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
