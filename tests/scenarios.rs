//! End-to-end scenarios from spec §8 (S1-S6), exercised against the crate's
//! public API the way a program embedding the runtime would use it.

use std::cell::RefCell;
use std::rc::Rc;

use cotask::task::new_return_sink;
use cotask::{
    coroutine, downcast_return, independent, await_child, concat, AnyValue, BoxedTask, ConditionVariableNotify,
    ConditionVariableWait, Executor, Mutex, MutexAcquire, MutexRelease, OnWaitFinish, StepOutcome, StepResult, Task,
    TaskCore, Waker,
};
use tracing_test::traced_test;

fn run_to_completion(executor: &Executor) -> StepOutcome {
    loop {
        match executor.step() {
            StepOutcome::MoreToGo => continue,
            other => return other,
        }
    }
}

// ---------------------------------------------------------------------
// S1: single mutex, two acquirers
// ---------------------------------------------------------------------

#[test]
fn s1_single_mutex_two_acquirers() {
    let executor = Executor::new();
    let mutex = Mutex::new();

    for _ in 0..2 {
        let mutex = mutex.clone();
        let acquire_release_twice = concat(vec![
            MutexAcquire::new(mutex.clone()),
            MutexRelease::new(mutex.clone()),
            MutexAcquire::new(mutex.clone()),
            MutexRelease::new(mutex),
        ]);
        executor.submit(acquire_release_twice);
    }

    assert_eq!(run_to_completion(&executor), StepOutcome::Done);
    assert!(!mutex.is_acquired());
}

// ---------------------------------------------------------------------
// S2: producer/consumer over a condition variable
// ---------------------------------------------------------------------

struct Enqueue {
    core: TaskCore,
    queue: Rc<RefCell<Option<i32>>>,
    value: i32,
}

impl Task for Enqueue {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        *self.queue.borrow_mut() = Some(self.value);
        StepResult::done_unit()
    }
}

struct PrintFromQueue {
    core: TaskCore,
    queue: Rc<RefCell<Option<i32>>>,
    printed: Rc<RefCell<Vec<i32>>>,
}

impl Task for PrintFromQueue {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        let value = self.queue.borrow_mut().take().expect("consumer woke with an empty queue");
        self.printed.borrow_mut().push(value);
        StepResult::done_unit()
    }
}

#[test]
fn s2_producer_consumer_over_condition_variable() {
    let executor = Executor::new();
    let mutex = Mutex::new();
    let cv = cotask::ConditionVariable::new();
    let queue = Rc::new(RefCell::new(None::<i32>));
    let printed = Rc::new(RefCell::new(Vec::new()));

    let consumer = concat(vec![
        MutexAcquire::new(mutex.clone()),
        ConditionVariableWait::new(mutex.clone(), cv.clone()),
        Box::new(PrintFromQueue { core: TaskCore::new("print"), queue: queue.clone(), printed: printed.clone() }),
        MutexRelease::new(mutex.clone()),
    ]);

    let producer = concat(vec![
        MutexAcquire::new(mutex.clone()),
        Box::new(Enqueue { core: TaskCore::new("enqueue"), queue: queue.clone(), value: 42 }),
        ConditionVariableNotify::one(cv.clone()),
        MutexRelease::new(mutex.clone()),
    ]);

    executor.submit(consumer);
    executor.submit(producer);

    assert_eq!(run_to_completion(&executor), StepOutcome::Done);
    assert_eq!(*printed.borrow(), vec![42]);
    assert!(queue.borrow().is_none());
    assert!(!mutex.is_acquired());
}

// ---------------------------------------------------------------------
// S3: fan-in ordering
// ---------------------------------------------------------------------

struct YieldsThenReturns {
    core: TaskCore,
    remaining: u32,
    value: i32,
}

impl Task for YieldsThenReturns {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        if self.remaining == 0 {
            StepResult::done(Box::new(self.value))
        } else {
            self.remaining -= 1;
            StepResult::ready()
        }
    }
}

fn yields_then_returns(name: &'static str, yields: u32, value: i32) -> BoxedTask {
    Box::new(YieldsThenReturns { core: TaskCore::new(name), remaining: yields, value })
}

struct FanInParent {
    core: TaskCore,
    stage: u8,
}

impl Task for FanInParent {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, child_return_values: Vec<Option<AnyValue>>) -> StepResult {
        match self.stage {
            0 => {
                self.stage = 1;
                let children = vec![
                    yields_then_returns("c1", 1, 1),
                    yields_then_returns("c2", 3, 2),
                    yields_then_returns("c3", 2, 3),
                ];
                StepResult::wait_for_children(OnWaitFinish::TaskNotDone, children)
            }
            _ => {
                let values: Vec<i32> =
                    child_return_values.into_iter().map(|v| downcast_return::<i32>(v.expect("every child must return a value"))).collect();
                StepResult::done(Box::new(values))
            }
        }
    }
}

#[test]
fn s3_fan_in_buffer_is_populated_in_input_order() {
    let executor = Executor::new();
    let mut parent: BoxedTask = Box::new(FanInParent { core: TaskCore::new("fan-in-parent"), stage: 0 });
    let sink = new_return_sink();
    parent.set_return_sink(sink.clone());
    executor.submit(parent);

    assert_eq!(run_to_completion(&executor), StepOutcome::Done);

    let values = downcast_return::<Vec<i32>>(sink.borrow_mut().take().expect("parent never resumed"));
    assert_eq!(values, vec![1, 2, 3]);
}

// ---------------------------------------------------------------------
// S4: sequential composite with an auto-done wait in the middle
// ---------------------------------------------------------------------

struct RecordOnce {
    core: TaskCore,
    id: u32,
    log: Rc<RefCell<Vec<u32>>>,
}

impl Task for RecordOnce {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        self.log.borrow_mut().push(self.id);
        StepResult::done_unit()
    }
}

/// Models the coroutine mutex-acquire variant from
/// `original_source/Mutex.cpp` (`mutex_acquire_task`), which parks with
/// `task_automatically_done` rather than `task_not_done` when the mutex is
/// already held — the only place spec §4.4's `Wait(task_auto_done,
/// Acquire(M))` wording (S4) applies, since the plain `MutexAcquire` always
/// parks with `task_not_done`.
struct AutoDoneAcquire {
    core: TaskCore,
    mutex: Rc<Mutex>,
}

impl Task for AutoDoneAcquire {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        StepResult::wait_on_waker(OnWaitFinish::TaskAutoDone, self.mutex.waker.clone())
    }
}

#[test]
fn s4_sequential_composite_advances_past_an_auto_done_wait() {
    let executor = Executor::new();
    let mutex = Mutex::new();

    // Hold the mutex up front so B parks immediately.
    let setup = Executor::new();
    setup.submit(MutexAcquire::new(mutex.clone()));
    setup.run_until_completion();
    assert!(mutex.is_acquired());

    let log = Rc::new(RefCell::new(Vec::new()));
    let a: BoxedTask = Box::new(RecordOnce { core: TaskCore::new("a"), id: 1, log: log.clone() });
    let b: BoxedTask = Box::new(AutoDoneAcquire { core: TaskCore::new("b"), mutex: mutex.clone() });
    let c: BoxedTask = Box::new(RecordOnce { core: TaskCore::new("c"), id: 3, log: log.clone() });

    executor.submit(concat(vec![a, b, c]));

    // Drive until the composite parks on b's wait; a must have already run,
    // and b must never have resumed (it only ever emits one StepResult).
    assert_eq!(run_to_completion(&executor), StepOutcome::DoneWithTasksSleeping);
    assert_eq!(*log.borrow(), vec![1]);

    mutex.waker.wake_all(&executor);
    assert_eq!(run_to_completion(&executor), StepOutcome::Done);
    assert_eq!(*log.borrow(), vec![1, 3]);
}

// ---------------------------------------------------------------------
// S5: independent composite with one ready slot and one blocked slot
// ---------------------------------------------------------------------

struct SpinTenTimes {
    core: TaskCore,
    remaining: u32,
    log: Rc<RefCell<Vec<u32>>>,
}

impl Task for SpinTenTimes {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        self.log.borrow_mut().push(self.remaining);
        if self.remaining == 0 {
            StepResult::done_unit()
        } else {
            self.remaining -= 1;
            StepResult::ready()
        }
    }
}

#[test]
fn s5_independent_keeps_running_a_ready_slot_while_a_sibling_sleeps() {
    let executor = Executor::new();
    let mutex = Mutex::new();

    let setup = Executor::new();
    setup.submit(MutexAcquire::new(mutex.clone()));
    setup.run_until_completion();
    assert!(mutex.is_acquired());

    let log = Rc::new(RefCell::new(Vec::new()));
    let spinner: BoxedTask = Box::new(SpinTenTimes { core: TaskCore::new("spin"), remaining: 9, log: log.clone() });
    let blocker = MutexAcquire::new(mutex.clone());

    executor.submit(independent(vec![spinner, blocker]));

    assert_eq!(run_to_completion(&executor), StepOutcome::DoneWithTasksSleeping);
    assert_eq!(log.borrow().len(), 10, "the spinner must run to completion while the blocker sleeps");

    executor.submit(MutexRelease::new(mutex.clone()));
    assert_eq!(run_to_completion(&executor), StepOutcome::Done);
}

// ---------------------------------------------------------------------
// S6: coroutine echo
// ---------------------------------------------------------------------

struct DropStamp {
    order: Rc<RefCell<Vec<&'static str>>>,
    label: &'static str,
}

impl Drop for DropStamp {
    fn drop(&mut self) {
        self.order.borrow_mut().push(self.label);
    }
}

struct StringChild {
    core: TaskCore,
    value: &'static str,
    _drop_stamp: DropStamp,
}

impl Task for StringChild {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        StepResult::done(Box::new(self.value.to_string()))
    }
}

#[test]
fn s6_coroutine_echoes_a_childs_string_and_destroys_the_child_first() {
    let executor = Executor::new();
    let drop_order = Rc::new(RefCell::new(Vec::new()));

    let child_drop_stamp = DropStamp { order: drop_order.clone(), label: "child" };
    let parent_drop_stamp = DropStamp { order: drop_order.clone(), label: "parent" };

    let mut parent: BoxedTask = coroutine("echo", async move {
        let _keep_alive = parent_drop_stamp;
        let child: BoxedTask =
            Box::new(StringChild { core: TaskCore::new("child"), value: "hello", _drop_stamp: child_drop_stamp });
        let value: Option<String> = await_child(child).await;
        value.expect("child completed with a value")
    });

    let sink = new_return_sink();
    parent.set_return_sink(sink.clone());
    executor.submit(parent);

    assert_eq!(run_to_completion(&executor), StepOutcome::Done);

    let value = downcast_return::<String>(sink.borrow_mut().take().expect("parent never resumed"));
    assert_eq!(value, "hello");
    assert_eq!(*drop_order.borrow(), vec!["child", "parent"]);
}

// ---------------------------------------------------------------------
// Shutdown diagnostics: a leaked sleeper is reported, not silently dropped.
// ---------------------------------------------------------------------

struct ParkForever {
    core: TaskCore,
    waker: cotask::SharedWaker,
}

impl Task for ParkForever {
    fn core(&self) -> &TaskCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }
    fn step(&mut self, _executor: &Executor, _c: Vec<Option<AnyValue>>) -> StepResult {
        StepResult::wait_on_waker(OnWaitFinish::TaskNotDone, self.waker.clone())
    }
}

#[traced_test]
#[test]
fn run_until_completion_warns_about_an_unreachable_sleeper() {
    let executor = Executor::new();
    let waker = cotask::FifoWaker::new();
    executor.submit(Box::new(ParkForever { core: TaskCore::new("park-forever"), waker }));

    executor.run_until_completion();

    assert!(logs_contain("drained with tasks still sleeping"));
}
