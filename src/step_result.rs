use crate::task::{AnyValue, BoxedTask};
use crate::waker::SharedWaker;

/// What should happen to a task once the `Wait` or `CompositeWait` it is
/// currently parked on is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnWaitFinish {
    /// The task is semantically complete at the point of suspension. Do not
    /// resume it; destroy it (firing on-done callbacks) when the wait fires.
    TaskAutoDone,
    /// Resume the task's step function when the wait fires.
    TaskNotDone,
}

/// What a `Wait` step result is parked on.
pub enum WaitFor {
    /// Park on a capability waker until it wakes this task.
    Waker(SharedWaker),
    /// Spawn the given children and park until all of them complete.
    ChildTasks(Vec<BoxedTask>),
}

/// The payload of a `StepResult::Wait` or the `inner` of a `CompositeWait`.
pub struct Wait {
    pub on_wait_finish: OnWaitFinish,
    pub wait_for: WaitFor,
}

impl Wait {
    pub fn new(on_wait_finish: OnWaitFinish, wait_for: WaitFor) -> Self {
        Self { on_wait_finish, wait_for }
    }

    pub fn on_waker(on_wait_finish: OnWaitFinish, waker: SharedWaker) -> Self {
        Self::new(on_wait_finish, WaitFor::Waker(waker))
    }

    pub fn on_children(on_wait_finish: OnWaitFinish, children: Vec<BoxedTask>) -> Self {
        Self::new(on_wait_finish, WaitFor::ChildTasks(children))
    }
}

/// A handle a composite uses to mutate one of its own slots from the
/// outside, used to build `status_chain` when a `CompositeWait` bubbles
/// through nested composites.
pub type SubtaskStatusHandle = std::rc::Rc<std::cell::Cell<crate::composite::SubtaskStatus>>;

/// The sum of values a task may yield on one step.
pub enum StepResult {
    /// The task is finished.
    Done { return_value: AnyValue, spawn: Vec<BoxedTask> },
    /// The task yields but remains runnable.
    Ready { high_priority: bool, spawn: Vec<BoxedTask> },
    /// The task suspends.
    Wait(Wait),
    /// Produced exclusively by composite tasks; carries a wait up through
    /// nested composites so the executor can park a helper task for the
    /// blocking leaf without stopping the composite's siblings.
    CompositeWait {
        all_siblings_sleeping: bool,
        root_waker: SharedWaker,
        status_chain: Vec<SubtaskStatusHandle>,
        inner: Box<Wait>,
    },
}

impl StepResult {
    pub fn done(return_value: AnyValue) -> Self {
        Self::Done { return_value, spawn: Vec::new() }
    }

    pub fn done_unit() -> Self {
        Self::done(Box::new(()))
    }

    pub fn done_with_spawn(return_value: AnyValue, spawn: Vec<BoxedTask>) -> Self {
        Self::Done { return_value, spawn }
    }

    pub fn ready() -> Self {
        Self::Ready { high_priority: false, spawn: Vec::new() }
    }

    pub fn ready_high_priority() -> Self {
        Self::Ready { high_priority: true, spawn: Vec::new() }
    }

    pub fn ready_with_spawn(spawn: Vec<BoxedTask>) -> Self {
        Self::Ready { high_priority: false, spawn }
    }

    pub fn wait_on_waker(on_wait_finish: OnWaitFinish, waker: SharedWaker) -> Self {
        Self::Wait(Wait::on_waker(on_wait_finish, waker))
    }

    pub fn wait_for_children(on_wait_finish: OnWaitFinish, children: Vec<BoxedTask>) -> Self {
        Self::Wait(Wait::on_children(on_wait_finish, children))
    }
}
