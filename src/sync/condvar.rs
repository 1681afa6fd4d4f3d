use std::rc::Rc;

use super::mutex::{Mutex, MutexAcquire};
use crate::executor::Executor;
use crate::step_result::{OnWaitFinish, StepResult};
use crate::task::{AnyValue, BoxedTask, Task, TaskCore};
use crate::waker::{FifoWaker, Waker};

/// A condition variable: nothing but a FIFO waker of its own, paired with a
/// mutex by the caller at each wait. Grounded on
/// `original_source/ConditionVariable.h`.
pub struct ConditionVariable {
    waker: Rc<FifoWaker>,
}

impl ConditionVariable {
    pub fn new() -> Rc<Self> {
        Rc::new(Self { waker: FifoWaker::new() })
    }
}

/// Two-stage wait: release `mutex` (waking a mutex waiter if the release
/// handed the lock onward), park on `cv`'s waker, then — once notified —
/// re-acquire `mutex` before reporting done. Grounded on
/// `original_source/ConditionVariable.cpp`'s
/// `ConditionVariableWaitTask::step`.
pub struct ConditionVariableWait {
    core: TaskCore,
    mutex: Rc<Mutex>,
    cv: Rc<ConditionVariable>,
    stage: u8,
}

impl ConditionVariableWait {
    pub fn new(mutex: Rc<Mutex>, cv: Rc<ConditionVariable>) -> BoxedTask {
        Box::new(Self { core: TaskCore::new("condvar-wait"), mutex, cv, stage: 0 })
    }
}

impl Task for ConditionVariableWait {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn step(&mut self, executor: &Executor, _child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        match self.stage {
            0 => {
                self.stage = 1;
                if self.mutex.waker.has_waiters() {
                    self.mutex.waker.wake_one(executor);
                } else {
                    self.mutex.release_without_waking();
                }
                StepResult::wait_on_waker(OnWaitFinish::TaskNotDone, self.cv.waker.clone())
            }
            1 => {
                self.stage = 2;
                StepResult::wait_for_children(OnWaitFinish::TaskAutoDone, vec![MutexAcquire::new(self.mutex.clone())])
            }
            _ => unreachable!("condition-variable wait stepped past its two stages"),
        }
    }
}

/// Wakes one (`notify_one`) or all (`notify_all`) waiters on `cv`. Grounded
/// on `original_source/ConditionVariable.cpp`'s
/// `ConditionVariableNotifyTask::step`.
pub struct ConditionVariableNotify {
    core: TaskCore,
    cv: Rc<ConditionVariable>,
    notify_all: bool,
}

impl ConditionVariableNotify {
    pub fn one(cv: Rc<ConditionVariable>) -> BoxedTask {
        Box::new(Self { core: TaskCore::new("condvar-notify-one"), cv, notify_all: false })
    }

    pub fn all(cv: Rc<ConditionVariable>) -> BoxedTask {
        Box::new(Self { core: TaskCore::new("condvar-notify-all"), cv, notify_all: true })
    }
}

impl Task for ConditionVariableNotify {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn step(&mut self, executor: &Executor, _child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        if self.cv.waker.has_waiters() {
            if self.notify_all {
                self.cv.waker.wake_all(executor);
            } else {
                self.cv.waker.wake_one(executor);
            }
        }
        StepResult::done_unit()
    }
}
