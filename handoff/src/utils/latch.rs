use parking_lot::{Condvar, Mutex};

/// A reusable countdown latch.
///
/// `arm` raises the count, `count_down` lowers it, and `wait` blocks until
/// the count reaches zero. Arming again after a full cycle is allowed, which
/// is what lets pooled objects reuse a single latch across invocations.
#[derive(Debug)]
pub(crate) struct Latch {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Latch {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn arm(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn count_down(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "count_down on an unarmed latch");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    pub(crate) fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.cond.wait(&mut count);
        }
    }
}
