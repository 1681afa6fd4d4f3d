use crate::executor::Executor;
use crate::step_result::{OnWaitFinish, StepResult};
use crate::task::{AnyValue, BoxedTask, Task, TaskCore};

/// Sequential composite: runs each task to completion, in order, before
/// starting the next. See SPEC_FULL.md §4.6.
pub struct Concat {
    core: TaskCore,
    slots: Vec<Option<BoxedTask>>,
    index: usize,
}

impl Concat {
    fn new(tasks: Vec<BoxedTask>) -> Self {
        Self { core: TaskCore::new("concat"), slots: tasks.into_iter().map(Some).collect(), index: 0 }
    }
}

/// Builds a sequential composite task from the given tasks, run in order.
pub fn concat(tasks: Vec<BoxedTask>) -> BoxedTask {
    Box::new(Concat::new(tasks))
}

impl Task for Concat {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn step(&mut self, executor: &Executor, child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        if self.index >= self.slots.len() {
            return StepResult::done_unit();
        }

        let slot = self.slots[self.index].as_mut().expect("concat slot revisited after consumption");
        let result = slot.step(executor, child_return_values);

        match result {
            StepResult::Done { return_value: _, spawn } => {
                self.slots[self.index] = None;
                self.index += 1;
                StepResult::ready_with_spawn(spawn)
            }
            StepResult::Ready { .. } => result,
            StepResult::Wait(mut wait) => {
                if matches!(wait.on_wait_finish, OnWaitFinish::TaskAutoDone) {
                    self.slots[self.index] = None;
                    self.index += 1;
                    wait.on_wait_finish = OnWaitFinish::TaskNotDone;
                }
                StepResult::Wait(wait)
            }
            StepResult::CompositeWait { all_siblings_sleeping, root_waker, status_chain, mut inner } => {
                if matches!(inner.on_wait_finish, OnWaitFinish::TaskAutoDone) {
                    self.slots[self.index] = None;
                    self.index += 1;
                    inner.on_wait_finish = OnWaitFinish::TaskNotDone;
                }
                StepResult::CompositeWait { all_siblings_sleeping, root_waker, status_chain, inner }
            }
        }
    }
}
