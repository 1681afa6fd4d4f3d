use std::cell::RefCell;
use std::rc::Rc;

use crate::executor::Executor;
use crate::waker::{SingleTaskWaker, Waker};

/// A fan-in cell shared by every child of a `Wait(ChildTasks)`. Each child's
/// completion decrements `remaining`; the final decrement fires `waker`,
/// unparking the waiting parent.
pub struct Counter {
    remaining: usize,
    waker: Rc<SingleTaskWaker>,
}

pub type SharedCounter = Rc<RefCell<Counter>>;

impl Counter {
    pub fn new(children: usize, waker: Rc<SingleTaskWaker>) -> SharedCounter {
        Rc::new(RefCell::new(Self { remaining: children, waker }))
    }

    /// Decrements the counter and, if it has reached zero, wakes the parked
    /// parent. Returns `true` exactly once, for the child whose completion
    /// drained the counter — this is not necessarily the last child by
    /// input order, only by completion order (see spec Testable Property 10).
    pub fn decrement(counter: &SharedCounter, executor: &Executor) -> bool {
        let mut this = counter.borrow_mut();
        debug_assert!(this.remaining > 0, "counter decremented past zero");
        this.remaining = this.remaining.saturating_sub(1);
        let drained = this.remaining == 0;
        let waker = this.waker.clone();
        drop(this);
        if drained {
            waker.wake_one(executor);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;

    #[test]
    fn fires_only_on_final_decrement() {
        let executor = Executor::new();
        let waker = SingleTaskWaker::new();
        let counter = Counter::new(3, waker);

        assert!(!Counter::decrement(&counter, &executor));
        assert!(!Counter::decrement(&counter, &executor));
        assert!(Counter::decrement(&counter, &executor));
    }
}
