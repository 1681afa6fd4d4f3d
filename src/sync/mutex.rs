use std::cell::Cell;
use std::rc::Rc;

use crate::executor::Executor;
use crate::step_result::{OnWaitFinish, StepResult};
use crate::task::{AnyValue, BoxedTask, Task, TaskCore};
use crate::waker::{FifoWaker, Waker};

/// A mutex enforced entirely by convention: the only thing preventing two
/// tasks from touching the same guarded state concurrently is that they
/// both go through `MutexAcquire`/`MutexRelease`. Grounded on
/// `original_source/Mutex.h`'s `Mutex` struct.
pub struct Mutex {
    is_acquired: Cell<bool>,
    /// The mutex's own wait queue, exposed directly (mirroring
    /// `original_source/Mutex.h`'s public `waker` member) so callers can
    /// build bespoke wait strategies atop the same queue `MutexAcquire`
    /// uses — e.g. an auto-done acquire variant, as in `tests/scenarios.rs`.
    pub waker: Rc<FifoWaker>,
}

impl Mutex {
    pub fn new() -> Rc<Self> {
        Rc::new(Self { is_acquired: Cell::new(false), waker: FifoWaker::new() })
    }

    pub fn is_acquired(&self) -> bool {
        self.is_acquired.get()
    }

    /// Clears `is_acquired` without touching the waker queue. Only valid
    /// when the queue is already known to be empty — callers that hold a
    /// waiter pending must wake it instead of clearing, per the transfer
    /// semantics in spec §4.4.
    pub(crate) fn release_without_waking(&self) {
        self.is_acquired.set(false);
    }
}

/// Acquires `mutex`, parking on its FIFO waker if already held. Grounded on
/// `original_source/Mutex.cpp`'s `MutexAcquireTask::step`, adapted for the
/// transfer semantics in spec §4.4: a release with waiters present hands
/// the lock directly to the next waiter without clearing `is_acquired`, so
/// a resumed acquirer must trust the transfer rather than re-checking the
/// flag (which is still `true`, and would otherwise park it forever).
pub struct MutexAcquire {
    core: TaskCore,
    mutex: Rc<Mutex>,
    parked: bool,
}

impl MutexAcquire {
    pub fn new(mutex: Rc<Mutex>) -> BoxedTask {
        Box::new(Self { core: TaskCore::new("mutex-acquire"), mutex, parked: false })
    }
}

impl Task for MutexAcquire {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn step(&mut self, _executor: &Executor, _child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        if self.parked {
            return StepResult::done_unit();
        }
        if self.mutex.is_acquired.get() {
            self.parked = true;
            StepResult::wait_on_waker(OnWaitFinish::TaskNotDone, self.mutex.waker.clone())
        } else {
            self.mutex.is_acquired.set(true);
            StepResult::done_unit()
        }
    }
}

/// Releases `mutex`. Per spec §4.4, if anyone is waiting, the lock is
/// transferred directly to the next waiter — the flag is left `true` and
/// never cleared — rather than cleared-then-reacquired.
pub struct MutexRelease {
    core: TaskCore,
    mutex: Rc<Mutex>,
}

impl MutexRelease {
    pub fn new(mutex: Rc<Mutex>) -> BoxedTask {
        Box::new(Self { core: TaskCore::new("mutex-release"), mutex })
    }
}

impl Task for MutexRelease {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn step(&mut self, executor: &Executor, _child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        if self.mutex.waker.has_waiters() {
            self.mutex.waker.wake_one(executor);
        } else {
            self.mutex.release_without_waking();
        }
        StepResult::done_unit()
    }
}
