//! A single-threaded cooperative task runtime: a scheduler plus a
//! task-composition algebra for structured concurrency over a shared
//! executor without threads. See `SPEC_FULL.md` for the full design.

pub mod composite;
pub mod coroutine;
pub mod counter;
pub mod error;
pub mod executor;
pub mod sleeping;
pub mod step_result;
pub mod sync;
pub mod task;
pub mod waker;

pub use composite::{concat, independent, SubtaskStatus};
pub use coroutine::{await_child, coroutine, executor_ref, yield_ready, CoroutineTask};
pub use error::RuntimeError;
pub use executor::{Executor, StepOutcome};
pub use step_result::{OnWaitFinish, StepResult, Wait, WaitFor};
pub use sync::{ConditionVariable, ConditionVariableNotify, ConditionVariableWait, Mutex, MutexAcquire, MutexRelease};
pub use task::{downcast_return, new_return_sink, AnyValue, BoxedTask, ReturnSink, Task, TaskCore};
pub use waker::{FifoWaker, ReusableSingleTaskWaker, SharedWaker, SingleTaskWaker, Waker};
