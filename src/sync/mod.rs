//! Synchronisation primitives built entirely from the `Task`/`Waker`
//! protocol — worked examples per spec §4.4/§5, not separately-privileged
//! runtime features. All shared state is a plain `Rc`-shared cell; nothing
//! here is safe to use across threads, matching the single-threaded
//! cooperative scheduling model.

pub mod condvar;
pub mod mutex;

pub use condvar::{ConditionVariable, ConditionVariableNotify, ConditionVariableWait};
pub use mutex::{Mutex, MutexAcquire, MutexRelease};
