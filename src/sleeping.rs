use crate::step_result::OnWaitFinish;
use crate::task::{BoxedTask, ReturnSink};

/// A generational handle into the sleeping slab, the crate's substitute for
/// the source's intrusive doubly-linked sentinel list (see DESIGN.md).
/// Wakers hold these non-owning handles; the slab owns the task itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SleepHandle {
    index: usize,
    generation: u64,
}

struct Slot {
    generation: u64,
    entry: Option<ParkedTask>,
}

pub struct ParkedTask {
    pub(crate) task: BoxedTask,
    pub(crate) destroy_on_wake: bool,
    /// Only set when this task parked on `WaitFor::ChildTasks`: the sinks
    /// its children write into, drained back into a `child_return_values`
    /// buffer when the task resumes (see `Executor::wake_sleeping_task`).
    pub(crate) pending_child_sinks: Option<Vec<ReturnSink>>,
}

impl ParkedTask {
    pub fn new(task: BoxedTask, on_wait_finish: OnWaitFinish) -> Self {
        Self {
            task,
            destroy_on_wake: matches!(on_wait_finish, OnWaitFinish::TaskAutoDone),
            pending_child_sinks: None,
        }
    }
}

/// A slab of parked tasks addressed by generational handle.
#[derive(Default)]
pub struct SleepingSlab {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl SleepingSlab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.entry.is_none())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn insert(&mut self, parked: ParkedTask) -> SleepHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.entry = Some(parked);
            SleepHandle { index, generation: slot.generation }
        } else {
            let index = self.slots.len();
            self.slots.push(Slot { generation: 0, entry: Some(parked) });
            SleepHandle { index, generation: 0 }
        }
    }

    /// Removes and returns the parked task at `handle`, if the handle is
    /// still valid (the slot hasn't since been reused by a newer generation).
    pub fn remove(&mut self, handle: SleepHandle) -> Option<ParkedTask> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let parked = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(parked)
    }
}
