use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::sleeping::SleepHandle;

/// A capability that can park and later resume sleeping tasks.
///
/// Wakers hold non-owning handles into the executor's sleeping slab; the
/// slab itself owns the parked task (see `sleeping.rs`).
pub trait Waker {
    fn has_waiters(&self) -> bool;
    fn add_waiter(&self, handle: SleepHandle) -> Result<(), RuntimeError>;
    fn wake_one(&self, executor: &Executor);
    fn wake_all(&self, executor: &Executor);
}

pub type SharedWaker = Rc<dyn Waker>;

/// An ordered queue of sleeping-task handles; waiters wake in the order
/// they parked.
#[derive(Default)]
pub struct FifoWaker {
    queue: RefCell<VecDeque<SleepHandle>>,
}

impl FifoWaker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl Waker for FifoWaker {
    fn has_waiters(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    fn add_waiter(&self, handle: SleepHandle) -> Result<(), RuntimeError> {
        self.queue.borrow_mut().push_back(handle);
        Ok(())
    }

    fn wake_one(&self, executor: &Executor) {
        let next = self.queue.borrow_mut().pop_front();
        if let Some(handle) = next {
            executor.wake_sleeping_task(handle);
        }
    }

    fn wake_all(&self, executor: &Executor) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(handle) => executor.wake_sleeping_task(handle),
                None => break,
            }
        }
    }
}

/// At most one waiter at a time. `add_waiter` fails if the slot is already
/// occupied. `wake_one` wakes the sole waiter but, deliberately, does not
/// clear the slot afterward — see DESIGN.md for why this mirrors the
/// source's `SingleTaskWaker` rather than the reusable variant below.
#[derive(Default)]
pub struct SingleTaskWaker {
    slot: RefCell<Option<SleepHandle>>,
}

impl SingleTaskWaker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl Waker for SingleTaskWaker {
    fn has_waiters(&self) -> bool {
        self.slot.borrow().is_some()
    }

    fn add_waiter(&self, handle: SleepHandle) -> Result<(), RuntimeError> {
        let mut slot = self.slot.borrow_mut();
        if slot.is_some() {
            return Err(RuntimeError::WakerAlreadyOccupied);
        }
        *slot = Some(handle);
        Ok(())
    }

    fn wake_one(&self, executor: &Executor) {
        let handle = *self.slot.borrow();
        if let Some(handle) = handle {
            executor.wake_sleeping_task(handle);
        }
    }

    fn wake_all(&self, executor: &Executor) {
        self.wake_one(executor);
    }
}

/// Identical to `SingleTaskWaker` except its slot clears on wake, so a new
/// waiter may register after each wake cycle.
#[derive(Default)]
pub struct ReusableSingleTaskWaker {
    slot: RefCell<Option<SleepHandle>>,
}

impl ReusableSingleTaskWaker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl Waker for ReusableSingleTaskWaker {
    fn has_waiters(&self) -> bool {
        self.slot.borrow().is_some()
    }

    fn add_waiter(&self, handle: SleepHandle) -> Result<(), RuntimeError> {
        let mut slot = self.slot.borrow_mut();
        if slot.is_some() {
            return Err(RuntimeError::WakerAlreadyOccupied);
        }
        *slot = Some(handle);
        Ok(())
    }

    fn wake_one(&self, executor: &Executor) {
        let handle = self.slot.borrow_mut().take();
        if let Some(handle) = handle {
            executor.wake_sleeping_task(handle);
        }
    }

    fn wake_all(&self, executor: &Executor) {
        self.wake_one(executor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::step_result::StepResult;
    use crate::task::{Task, TaskCore};

    struct Marker(TaskCore, Rc<RefCell<bool>>);

    impl Task for Marker {
        fn core(&self) -> &TaskCore {
            &self.0
        }
        fn core_mut(&mut self) -> &mut TaskCore {
            &mut self.0
        }
        fn step(&mut self, _executor: &Executor, _c: Vec<Option<crate::task::AnyValue>>) -> StepResult {
            *self.1.borrow_mut() = true;
            StepResult::done_unit()
        }
    }

    #[test]
    fn fifo_waker_wakes_in_insertion_order() {
        let executor = Executor::new();
        let waker = FifoWaker::new();
        let ran = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let ran = ran.clone();
            let handle = executor.park_for_test(
                Box::new(FnTask::new(move || {
                    ran.borrow_mut().push(i);
                })),
                waker.clone(),
            );
            waker.add_waiter(handle).unwrap();
        }

        waker.wake_all(&executor);
        executor.run_until_completion();
        assert_eq!(*ran.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn single_task_waker_rejects_second_waiter() {
        let executor = Executor::new();
        let waker = SingleTaskWaker::new();
        let h1 = executor.park_for_test(Box::new(FnTask::new(|| {})), waker.clone());
        waker.add_waiter(h1).unwrap();

        let h2 = executor.park_for_test(Box::new(FnTask::new(|| {})), waker.clone());
        assert!(matches!(waker.add_waiter(h2), Err(RuntimeError::WakerAlreadyOccupied)));
    }

    #[test]
    fn reusable_single_task_waker_rearms_after_wake() {
        let executor = Executor::new();
        let waker = ReusableSingleTaskWaker::new();
        let h1 = executor.park_for_test(Box::new(FnTask::new(|| {})), waker.clone());
        waker.add_waiter(h1).unwrap();
        waker.wake_one(&executor);
        assert!(!waker.has_waiters());

        let h2 = executor.park_for_test(Box::new(FnTask::new(|| {})), waker.clone());
        assert!(waker.add_waiter(h2).is_ok());
    }

    struct FnTask<F: FnMut()>(TaskCore, F);
    impl<F: FnMut()> FnTask<F> {
        fn new(f: F) -> Self {
            Self(TaskCore::new("fn-task"), f)
        }
    }
    impl<F: FnMut()> Task for FnTask<F> {
        fn core(&self) -> &TaskCore {
            &self.0
        }
        fn core_mut(&mut self) -> &mut TaskCore {
            &mut self.0
        }
        fn step(&mut self, _executor: &Executor, _c: Vec<Option<crate::task::AnyValue>>) -> StepResult {
            (self.1)();
            StepResult::done_unit()
        }
    }
}
