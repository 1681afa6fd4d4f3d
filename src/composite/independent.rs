use std::cell::Cell;
use std::rc::Rc;

use super::SubtaskStatus;
use crate::executor::Executor;
use crate::step_result::{StepResult, SubtaskStatusHandle};
use crate::task::{AnyValue, BoxedTask, Task, TaskCore};
use crate::waker::{ReusableSingleTaskWaker, Waker};

struct Slot {
    task: BoxedTask,
    status: SubtaskStatusHandle,
}

/// Parallel-at-the-logical-level composite: every slot is interleaved on
/// the single executor, and an individual slot can sleep without blocking
/// its siblings. See SPEC_FULL.md §4.6 for the full dispatch table this
/// implements.
pub struct Independent {
    core: TaskCore,
    slots: Vec<Slot>,
    self_waker: Rc<dyn Waker>,
}

impl Independent {
    fn new(tasks: Vec<BoxedTask>) -> Self {
        let slots = tasks
            .into_iter()
            .map(|task| Slot { task, status: Rc::new(Cell::new(SubtaskStatus::Ready)) })
            .collect();
        // A reusable waker: the composite can go fully to sleep and be
        // woken more than once over its lifetime, one leaf at a time.
        Self { core: TaskCore::new("independent"), slots, self_waker: ReusableSingleTaskWaker::new() }
    }

    /// Advances the first non-`Done` slot starting at `start`, recursing
    /// into the remainder exactly as SPEC_FULL.md §4.6 describes: a slot
    /// transitioning to `Ready`/`Wait`/`CompositeWait` returns immediately;
    /// only a slot that becomes `Done` (or was already `Done`/left
    /// `Waiting`) falls through to let the remaining slots run within the
    /// same call.
    fn advance(&mut self, start: usize, executor: &Executor, child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        let is_last = start + 1 == self.slots.len();
        let status = self.slots[start].status.get();

        if status != SubtaskStatus::Done && (status == SubtaskStatus::Ready || is_last) {
            // Stepping a `Waiting` slot here only happens for the trailing
            // slot, and only when it's re-entered to refresh its wait (see
            // below) or directly driven as the sole remaining slot; either
            // way the task must be re-entrant while `Waiting`.
            let result = self.slots[start].task.step(executor, child_return_values);
            debug_assert!(
                status != SubtaskStatus::Waiting
                    || matches!(result, StepResult::Wait(_) | StepResult::CompositeWait { .. }),
                "composite slot resumed while waiting returned neither Wait nor CompositeWait"
            );
            return self.finish_slot_step(start, is_last, result);
        }

        // This slot is `Waiting` and not the last one: leave it parked and
        // consult the rest of the slots within this same call.
        let head_waiting = status == SubtaskStatus::Waiting;
        if is_last {
            return StepResult::done_unit();
        }

        let tail_result = self.advance(start + 1, executor, Vec::new());
        match tail_result {
            StepResult::Done { return_value, spawn } if head_waiting => {
                // Every other slot is now done; the sole remaining waiting
                // slot determines whether the whole composite sleeps. Its
                // step function must be idempotent while `Waiting` (same
                // invariant as above), so re-entering it here is safe and
                // simply refreshes its wait.
                let _ = (return_value, spawn);
                let refreshed = self.slots[start].task.step(executor, Vec::new());
                self.wrap_all_sleeping(start, refreshed)
            }
            other => other,
        }
    }

    fn finish_slot_step(&mut self, index: usize, is_last: bool, result: StepResult) -> StepResult {
        match result {
            StepResult::Done { return_value: _, spawn } => {
                self.slots[index].status.set(SubtaskStatus::Done);
                if is_last {
                    StepResult::done_with_spawn(Box::new(()), spawn)
                } else {
                    StepResult::ready_with_spawn(spawn)
                }
            }
            StepResult::Ready { .. } => result,
            StepResult::Wait(wait) => {
                self.slots[index].status.set(SubtaskStatus::Waiting);
                let chain = vec![self.slots[index].status.clone()];
                StepResult::CompositeWait {
                    all_siblings_sleeping: is_last,
                    root_waker: self.self_waker.clone(),
                    status_chain: chain,
                    inner: Box::new(wait),
                }
            }
            StepResult::CompositeWait { all_siblings_sleeping, status_chain: mut chain, inner, .. } => {
                self.slots[index].status.set(SubtaskStatus::Waiting);
                chain.push(self.slots[index].status.clone());
                StepResult::CompositeWait {
                    all_siblings_sleeping: is_last && all_siblings_sleeping,
                    root_waker: self.self_waker.clone(),
                    status_chain: chain,
                    inner,
                }
            }
        }
    }

    fn wrap_all_sleeping(&mut self, index: usize, result: StepResult) -> StepResult {
        match result {
            StepResult::Wait(wait) => {
                let chain = vec![self.slots[index].status.clone()];
                StepResult::CompositeWait {
                    all_siblings_sleeping: true,
                    root_waker: self.self_waker.clone(),
                    status_chain: chain,
                    inner: Box::new(wait),
                }
            }
            StepResult::CompositeWait { status_chain: mut chain, inner, .. } => {
                chain.push(self.slots[index].status.clone());
                StepResult::CompositeWait {
                    all_siblings_sleeping: true,
                    root_waker: self.self_waker.clone(),
                    status_chain: chain,
                    inner,
                }
            }
            _ => unreachable!("a slot left Waiting must resume into Wait or CompositeWait"),
        }
    }
}

/// Builds a parallel-interleaved composite task from the given tasks.
pub fn independent(tasks: Vec<BoxedTask>) -> BoxedTask {
    assert!(!tasks.is_empty(), "independent() requires at least one task");
    Box::new(Independent::new(tasks))
}

impl Task for Independent {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn step(&mut self, executor: &Executor, child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        self.advance(0, executor, child_return_values)
    }
}
