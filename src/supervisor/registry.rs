//! Fixed-capacity task table.

use heapless::Vec;

use super::descriptor::{TaskDescriptor, TaskState};
use super::traits::TaskLauncher;
use crate::config::MAX_TASKS;
use crate::error::SupervisorError;

/// Registers task descriptors and launches them through `L`.
///
/// Tasks are addressed by their registration index, which never changes:
/// descriptors are never removed.
pub struct Supervisor<E, L, const N: usize = MAX_TASKS> {
    tasks: Vec<TaskDescriptor<E>, N>,
    launcher: L,
}

impl<E, L, const N: usize> Supervisor<E, L, N>
where
    L: TaskLauncher<E>,
{
    pub fn new(launcher: L) -> Self {
        Self {
            tasks: Vec::new(),
            launcher,
        }
    }

    /// Appends `descriptor` and returns its index.
    ///
    /// Fails with `InvalidArgument` for a malformed descriptor and `Full`
    /// when the table has no free slot; the table is unchanged either way.
    pub fn register(&mut self, descriptor: TaskDescriptor<E>) -> Result<usize, SupervisorError> {
        descriptor.validate()?;
        let name = descriptor.name;
        self.tasks
            .push(TaskDescriptor {
                state: TaskState::Registered,
                ..descriptor
            })
            .map_err(|_| {
                warn!("supervisor: no slot left for task {}", name);
                SupervisorError::Full
            })?;
        debug!("supervisor: registered task {}", name);
        Ok(self.tasks.len() - 1)
    }

    /// Launches every registered task that is not running yet, in
    /// registration order.
    ///
    /// Stops at the first launch failure: that task is marked faulted, the
    /// ones after it stay registered, and the failing index is returned.
    pub fn start_all(&mut self) -> Result<(), SupervisorError> {
        for index in 0..self.tasks.len() {
            if self.tasks[index].state != TaskState::Running {
                self.launch(index)?;
            }
        }
        info!("supervisor: {} tasks running", self.tasks.len());
        Ok(())
    }

    /// Registers and immediately launches a late-bound task.
    pub fn attach(&mut self, descriptor: TaskDescriptor<E>) -> Result<usize, SupervisorError> {
        let index = self.register(descriptor)?;
        self.launch(index)?;
        Ok(index)
    }

    fn launch(&mut self, index: usize) -> Result<(), SupervisorError> {
        let task = &mut self.tasks[index];
        match self.launcher.launch(task) {
            Ok(()) => {
                task.state = TaskState::Running;
                info!(
                    "supervisor: started {} (priority {}, stack {})",
                    task.name, task.priority.0, task.stack_size
                );
                Ok(())
            }
            Err(e) => {
                task.state = TaskState::Faulted;
                error!(
                    "supervisor: failed to start {}: {:?}",
                    task.name,
                    crate::fmt::Dbg(&e)
                );
                Err(SupervisorError::LaunchFailed(index))
            }
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn task_name(&self, index: usize) -> Option<&'static str> {
        self.tasks.get(index).map(|task| task.name)
    }

    pub fn state(&self, index: usize) -> Option<TaskState> {
        self.tasks.get(index).map(|task| task.state)
    }

    /// Unused stack of a running task; zero when the task is not running or
    /// the platform cannot measure it.
    pub fn stack_headroom(&self, index: usize) -> Result<usize, SupervisorError> {
        let task = self
            .tasks
            .get(index)
            .ok_or(SupervisorError::UnknownTask(index))?;
        if task.state != TaskState::Running {
            return Ok(0);
        }
        Ok(self.launcher.stack_headroom(task).unwrap_or(0))
    }

    /// Logs one line per task; meant for a periodic health task.
    pub fn log_report(&self) {
        for (index, task) in self.tasks.iter().enumerate() {
            let headroom = self.stack_headroom(index).unwrap_or(0);
            info!(
                "supervisor: #{} {} {:?} headroom {}",
                index, task.name, task.state, headroom
            );
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{MIN_STACK_SIZE, Priority};

    #[derive(Default)]
    struct RecordingLauncher {
        launched: std::vec::Vec<&'static str>,
        fail_on: Option<&'static str>,
    }

    impl TaskLauncher<()> for RecordingLauncher {
        type Error = &'static str;

        fn launch(&mut self, descriptor: &TaskDescriptor<()>) -> Result<(), Self::Error> {
            if self.fail_on == Some(descriptor.name) {
                return Err("out of memory");
            }
            self.launched.push(descriptor.name);
            Ok(())
        }

        fn stack_headroom(&self, descriptor: &TaskDescriptor<()>) -> Option<usize> {
            Some(descriptor.stack_size / 2)
        }
    }

    fn task(name: &'static str) -> TaskDescriptor<()> {
        TaskDescriptor::new(name, 4096, Priority::SERVICE, ())
    }

    #[test]
    fn register_past_capacity_is_full() {
        let mut supervisor = Supervisor::<_, _, 2>::new(RecordingLauncher::default());
        assert_eq!(supervisor.register(task("a")), Ok(0));
        assert_eq!(supervisor.register(task("b")), Ok(1));
        assert_eq!(supervisor.register(task("c")), Err(SupervisorError::Full));
        assert_eq!(supervisor.task_count(), 2);
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        let mut supervisor = Supervisor::<_, _, 4>::new(RecordingLauncher::default());
        assert_eq!(
            supervisor.register(task("")),
            Err(SupervisorError::InvalidArgument)
        );
        assert_eq!(
            supervisor.register(task("a_name_that_is_too_long")),
            Err(SupervisorError::InvalidArgument)
        );
        assert_eq!(
            supervisor.register(TaskDescriptor::new(
                "tiny",
                MIN_STACK_SIZE - 1,
                Priority::SERVICE,
                ()
            )),
            Err(SupervisorError::InvalidArgument)
        );
        assert_eq!(supervisor.task_count(), 0);
    }

    #[test]
    fn start_all_is_fail_fast() {
        let launcher = RecordingLauncher {
            fail_on: Some("mqtt"),
            ..Default::default()
        };
        let mut supervisor = Supervisor::<_, _, 4>::new(launcher);
        for name in ["watchdog", "network", "mqtt", "sntp"] {
            supervisor.register(task(name)).unwrap();
        }

        assert_eq!(
            supervisor.start_all(),
            Err(SupervisorError::LaunchFailed(2))
        );
        assert_eq!(supervisor.launcher().launched, ["watchdog", "network"]);
        assert_eq!(supervisor.state(1), Some(TaskState::Running));
        assert_eq!(supervisor.state(2), Some(TaskState::Faulted));
        assert_eq!(supervisor.state(3), Some(TaskState::Registered));
    }

    #[test]
    fn start_all_does_not_relaunch_running_tasks() {
        let mut supervisor = Supervisor::<_, _, 4>::new(RecordingLauncher::default());
        supervisor.register(task("network")).unwrap();
        supervisor.start_all().unwrap();
        supervisor.register(task("mqtt")).unwrap();
        supervisor.start_all().unwrap();
        assert_eq!(supervisor.launcher().launched, ["network", "mqtt"]);
    }

    #[test]
    fn attach_registers_and_launches() {
        let mut supervisor = Supervisor::<_, _, 4>::new(RecordingLauncher::default());
        assert_eq!(supervisor.attach(task("http")), Ok(0));
        assert_eq!(supervisor.state(0), Some(TaskState::Running));
        assert_eq!(supervisor.task_name(0), Some("http"));
        assert_eq!(supervisor.stack_headroom(0), Ok(2048));
        assert_eq!(
            supervisor.stack_headroom(1),
            Err(SupervisorError::UnknownTask(1))
        );
    }

    #[test]
    fn attach_reports_launch_failure() {
        let launcher = RecordingLauncher {
            fail_on: Some("http"),
            ..Default::default()
        };
        let mut supervisor = Supervisor::<_, _, 4>::new(launcher);
        assert_eq!(
            supervisor.attach(task("http")),
            Err(SupervisorError::LaunchFailed(0))
        );
        assert_eq!(supervisor.stack_headroom(0), Ok(0));
    }
}
