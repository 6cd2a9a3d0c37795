//! Task Registry & Supervisor
//!
//! Every long-running component of the gateway gets its own task. The
//! supervisor keeps a static table of [`TaskDescriptor`]s, launches them in
//! registration order through a platform [`TaskLauncher`], and answers
//! diagnostic questions about them.
//!
//! ```ignore
//! let mut supervisor = Supervisor::<_, _>::new(EmbassyLauncher::new(spawner));
//! supervisor.register(TaskDescriptor::for_runnable(&network, spawn_network))?;
//! supervisor.register(TaskDescriptor::for_runnable(&bridge, spawn_bridge))?;
//! supervisor.start_all()?;
//! ```
//!
//! Startup is fail-fast: the first task that cannot be launched stops
//! `start_all`, leaving later tasks registered but not started.

mod descriptor;
mod registry;
mod traits;

pub use descriptor::{
    DEFAULT_STACK_SIZE, MAX_TASK_NAME_LEN, MIN_STACK_SIZE, Priority, TaskDescriptor, TaskState,
};
pub use registry::Supervisor;
pub use traits::{Runnable, TaskLauncher};
