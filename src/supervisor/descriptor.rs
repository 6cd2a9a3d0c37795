use crate::error::SupervisorError;

/// Longest task name the launcher accepts.
pub const MAX_TASK_NAME_LEN: usize = 16;
/// Smallest stack budget a descriptor may ask for, in bytes.
pub const MIN_STACK_SIZE: usize = 1024;
/// Stack budget used when a [`Runnable`](super::Runnable) does not pick one.
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// Scheduling priority. Higher values preempt lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(pub u8);

impl Priority {
    /// Watchdog and other supervisory work.
    pub const HEALTH: Self = Self(6);
    /// Connectivity management.
    pub const NETWORK: Self = Self(5);
    /// Broker bridge and configuration server.
    pub const SERVICE: Self = Self(4);
    /// Time synchronization and other best-effort work.
    pub const BACKGROUND: Self = Self(3);
}

/// Lifecycle of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// In the table, not started yet.
    Registered,
    /// The launcher created the task.
    Running,
    /// The launcher failed to create the task.
    Faulted,
}

/// Static description of one task.
///
/// `entry` is whatever the launcher needs to create the task: a spawn
/// function, a pool index, a boxed future factory.
#[derive(Debug, Clone)]
pub struct TaskDescriptor<E> {
    pub name: &'static str,
    pub stack_size: usize,
    pub priority: Priority,
    pub entry: E,
    pub(crate) state: TaskState,
}

impl<E> TaskDescriptor<E> {
    pub fn new(name: &'static str, stack_size: usize, priority: Priority, entry: E) -> Self {
        Self {
            name,
            stack_size,
            priority,
            entry,
            state: TaskState::Registered,
        }
    }

    /// Builds a descriptor from a runnable's own name, priority and stack budget.
    pub fn for_runnable<R: super::Runnable + ?Sized>(runnable: &R, entry: E) -> Self {
        Self::new(
            runnable.name(),
            runnable.stack_size(),
            runnable.priority(),
            entry,
        )
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn validate(&self) -> Result<(), SupervisorError> {
        if self.name.is_empty() || self.name.len() > MAX_TASK_NAME_LEN {
            return Err(SupervisorError::InvalidArgument);
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(SupervisorError::InvalidArgument);
        }
        Ok(())
    }
}
