//! Seams between the supervisor, the executor and the tasks it runs.

use super::descriptor::{DEFAULT_STACK_SIZE, Priority, TaskDescriptor};
use crate::hub::RuntimeContext;

/// Creates the underlying scheduled task for a descriptor.
///
/// On Embassy this wraps a `Spawner`; `entry` is typically a function that
/// builds the task's `SpawnToken`. Tests use a recording fake.
pub trait TaskLauncher<E> {
    type Error: core::fmt::Debug;

    fn launch(&mut self, descriptor: &TaskDescriptor<E>) -> Result<(), Self::Error>;

    /// Unused stack of the task launched from `descriptor`, in bytes, if the
    /// platform can measure it.
    fn stack_headroom(&self, _descriptor: &TaskDescriptor<E>) -> Option<usize> {
        None
    }
}

/// A long-running component driven by its own task.
///
/// `run` returns only when the component gives up, e.g. on a fatal
/// initialization error; the task then ends with it.
#[allow(async_fn_in_trait)]
pub trait Runnable {
    fn name(&self) -> &'static str;

    fn priority(&self) -> Priority;

    fn stack_size(&self) -> usize {
        DEFAULT_STACK_SIZE
    }

    async fn run(&mut self, ctx: &RuntimeContext<'_>);
}
