use std::cell::RefCell;
use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::counter::Counter;
use crate::sleeping::{ParkedTask, SleepHandle, SleepingSlab};
use crate::step_result::{OnWaitFinish, StepResult, SubtaskStatusHandle, Wait, WaitFor};
use crate::task::{new_return_sink, AnyValue, BoxedTask, ReturnSink, Task, TaskCore};
use crate::waker::{SharedWaker, SingleTaskWaker};

/// The outcome of one `Executor::step()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing runnable, nothing sleeping: the whole task tree is finished.
    Done,
    /// Nothing runnable, but the sleeping slab is non-empty: at least one
    /// task is parked on a waker that will never fire (a leak, reported as
    /// a warning by `run_until_completion`, not forcibly cleaned up).
    DoneWithTasksSleeping,
    /// There is more runnable work; call `step()` again.
    MoreToGo,
}

struct Runnable {
    task: BoxedTask,
    child_return_values: Vec<Option<AnyValue>>,
}

/// The single-threaded cooperative scheduler: a runnable deque, a sleeping
/// slab, and the `step()` loop that routes each task's `StepResult`.
///
/// All shared state is interior-mutable (`RefCell`) rather than requiring
/// `&mut Executor`, so that task step functions — which only ever observe
/// `&Executor` — can submit children and park themselves through the same
/// reference the top-level caller holds.
pub struct Executor {
    runnable: RefCell<VecDeque<Runnable>>,
    sleeping: RefCell<SleepingSlab>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self { runnable: RefCell::new(VecDeque::new()), sleeping: RefCell::new(SleepingSlab::new()) }
    }

    /// Adds a task to the back of the runnable deque.
    pub fn submit(&self, task: BoxedTask) {
        self.submit_with_values(task, Vec::new());
    }

    fn submit_with_values(&self, task: BoxedTask, child_return_values: Vec<Option<AnyValue>>) {
        trace!(task = task.name(), "submit");
        self.runnable.borrow_mut().push_back(Runnable { task, child_return_values });
    }

    fn submit_front(&self, task: BoxedTask, child_return_values: Vec<Option<AnyValue>>) {
        trace!(task = task.name(), "submit (front)");
        self.runnable.borrow_mut().push_front(Runnable { task, child_return_values });
    }

    /// Called by a `Waker` impl to return a parked task to the runnable set,
    /// or destroy it outright if it was parked with `destroy_on_wake`.
    pub fn wake_sleeping_task(&self, handle: SleepHandle) {
        let parked = self.sleeping.borrow_mut().remove(handle);
        let Some(parked) = parked else {
            debug!("wake on a stale sleeping handle ignored");
            return;
        };
        let ParkedTask { task, destroy_on_wake, pending_child_sinks } = parked;
        if destroy_on_wake {
            debug!(task = task.name(), "waking task directly into destruction");
            finish_task(self, task, Box::new(()));
        } else {
            debug!(task = task.name(), "waking task back onto the runnable deque");
            let values = match pending_child_sinks {
                Some(sinks) => sinks.into_iter().map(|sink| sink.borrow_mut().take()).collect(),
                None => Vec::new(),
            };
            self.submit_with_values(task, values);
        }
    }

    /// Advances the scheduler by one task. See module docs and SPEC_FULL.md
    /// §4.1 for the dispatch table this implements.
    pub fn step(&self) -> StepOutcome {
        let next = self.runnable.borrow_mut().pop_front();
        let Some(Runnable { mut task, child_return_values }) = next else {
            return self.idle_outcome();
        };

        let name = task.name().to_string();
        let result = task.step(self, child_return_values);

        match result {
            StepResult::Done { return_value, spawn } => {
                trace!(task = %name, "step -> Done");
                for child in spawn {
                    self.submit(child);
                }
                finish_task(self, task, return_value);
            }
            StepResult::Ready { high_priority, spawn } => {
                trace!(task = %name, high_priority, "step -> Ready");
                for child in spawn {
                    self.submit(child);
                }
                if high_priority {
                    self.submit_front(task, Vec::new());
                } else {
                    self.submit(task);
                }
            }
            StepResult::Wait(wait) => {
                trace!(task = %name, "step -> Wait");
                self.park(task, wait);
            }
            StepResult::CompositeWait { all_siblings_sleeping, root_waker: _root_waker, status_chain, inner } => {
                trace!(task = %name, all_siblings_sleeping, "step -> CompositeWait");
                self.park_composite_wait(task, all_siblings_sleeping, status_chain, *inner);
            }
        }

        self.idle_outcome()
    }

    fn idle_outcome(&self) -> StepOutcome {
        if !self.runnable.borrow().is_empty() {
            StepOutcome::MoreToGo
        } else if self.sleeping.borrow().is_empty() {
            StepOutcome::Done
        } else {
            StepOutcome::DoneWithTasksSleeping
        }
    }

    fn park(&self, task: BoxedTask, wait: Wait) {
        let on_wait_finish = wait.on_wait_finish;
        match wait.wait_for {
            WaitFor::Waker(waker) => {
                let parked = ParkedTask::new(task, on_wait_finish);
                let handle = self.sleeping.borrow_mut().insert(parked);
                waker.add_waiter(handle).expect("waker capacity invariant violated");
            }
            WaitFor::ChildTasks(children) => {
                if children.is_empty() {
                    // Vacuously satisfied: nothing to wait for.
                    if matches!(on_wait_finish, OnWaitFinish::TaskAutoDone) {
                        finish_task(self, task, Box::new(()));
                    } else {
                        self.submit(task);
                    }
                    return;
                }
                let (waker, sinks) = fan_in_children(self, children);
                let mut parked = ParkedTask::new(task, on_wait_finish);
                parked.pending_child_sinks = Some(sinks);
                let handle = self.sleeping.borrow_mut().insert(parked);
                waker.add_waiter(handle).expect("freshly allocated counter waker is never pre-occupied");
            }
        }
    }

    /// Translates a `CompositeWait` into a parked helper task on the leaf
    /// wait it carries, per SPEC_FULL.md §4.6. The helper is always parked
    /// with `TaskNotDone` (it must run its own `step` to flip the relevant
    /// `SubtaskStatus`); whether the *original* leaf wait was auto-done is
    /// captured as the helper's own state instead of the park-level flag.
    fn park_composite_wait(
        &self,
        composite: BoxedTask,
        all_siblings_sleeping: bool,
        status_chain: Vec<SubtaskStatusHandle>,
        mut inner: Wait,
    ) {
        let leaf_destroy = matches!(inner.on_wait_finish, OnWaitFinish::TaskAutoDone);
        inner.on_wait_finish = OnWaitFinish::TaskNotDone;

        if all_siblings_sleeping {
            let helper = HelperTask::full(status_chain, composite, leaf_destroy);
            self.park(Box::new(helper), inner);
        } else {
            let helper = HelperTask::partial(status_chain, leaf_destroy);
            self.park(Box::new(helper), inner);
            self.submit_front(composite, Vec::new());
        }
    }

    pub fn run_until_completion(&self) {
        loop {
            match self.step() {
                StepOutcome::Done => break,
                StepOutcome::DoneWithTasksSleeping => {
                    warn!(sleeping = self.sleeping.borrow().len(), "executor drained with tasks still sleeping");
                    break;
                }
                StepOutcome::MoreToGo => continue,
            }
        }
    }

    /// Test-only: park a task directly on a waker's wait queue without
    /// going through a real `Wait` step result, to exercise waker
    /// implementations in isolation from a full task tree.
    #[cfg(test)]
    pub(crate) fn park_for_test(&self, task: BoxedTask, _waker: SharedWaker) -> SleepHandle {
        self.sleeping.borrow_mut().insert(ParkedTask::new(task, OnWaitFinish::TaskNotDone))
    }
}

fn finish_task(executor: &Executor, mut task: BoxedTask, return_value: AnyValue) {
    if let Some(sink) = task.return_sink() {
        *sink.borrow_mut() = Some(return_value);
    }
    for callback in task.take_on_done() {
        callback(executor);
    }
}

/// Shared fan-in implementation for `Wait(ChildTasks)`, used both by the
/// executor for a top-level waiting task and by composite tasks (§4.6) when
/// one of their slots itself awaits children. Allocates a counter sized to
/// `children.len()`, wires each child's return sink, attaches a decrementing
/// on-done callback to each child, and submits them all.
pub(crate) fn fan_in_children(executor: &Executor, children: Vec<BoxedTask>) -> (SharedWaker, Vec<ReturnSink>) {
    let sinks: Vec<ReturnSink> = (0..children.len()).map(|_| new_return_sink()).collect();
    let waker = SingleTaskWaker::new();
    let counter = Counter::new(children.len(), waker.clone());

    for (mut child, sink) in children.into_iter().zip(sinks.iter().cloned()) {
        child.set_return_sink(sink);
        let counter_for_child = counter.clone();
        child.push_on_done(Box::new(move |executor: &Executor| {
            Counter::decrement(&counter_for_child, executor);
        }));
        executor.submit(child);
    }

    (waker, sinks)
}

/// The transient task the executor parks in place of a composite while one
/// of its leaves sleeps. On wake it flips the relevant `SubtaskStatus`
/// handles and, for a full-wake, re-submits the composite it was holding.
struct HelperTask {
    core: TaskCore,
    status_chain: Vec<SubtaskStatusHandle>,
    composite: Option<BoxedTask>,
    leaf_destroy: bool,
}

impl HelperTask {
    fn partial(status_chain: Vec<SubtaskStatusHandle>, leaf_destroy: bool) -> Self {
        Self { core: TaskCore::new("composite-partial-wake-helper"), status_chain, composite: None, leaf_destroy }
    }

    fn full(status_chain: Vec<SubtaskStatusHandle>, composite: BoxedTask, leaf_destroy: bool) -> Self {
        Self {
            core: TaskCore::new("composite-full-wake-helper"),
            status_chain,
            composite: Some(composite),
            leaf_destroy,
        }
    }
}

impl Task for HelperTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn step(&mut self, _executor: &Executor, _child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        use crate::composite::SubtaskStatus;

        if let Some((leaf, outer_levels)) = self.status_chain.split_first() {
            leaf.set(if self.leaf_destroy { SubtaskStatus::Done } else { SubtaskStatus::Ready });
            for level in outer_levels {
                level.set(SubtaskStatus::Ready);
            }
        }

        match self.composite.take() {
            Some(composite) => StepResult::done_with_spawn(Box::new(()), vec![composite]),
            None => StepResult::done_unit(),
        }
    }
}
