mod activity;
pub mod capture;
pub mod injector;
pub mod registry;
pub mod resolver;
pub mod sync;
pub mod transcript;

pub use activity::Activity;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::desktop::{ElementId, WindowHandle};

/// Liveness of a tracked worker. Starting until the first resolution attempt;
/// afterwards flips between Online and Offline with the window it is bound
/// to. No terminal state: a worker leaves the tracked set only when the user
/// disconnects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerStatus {
    #[default]
    Starting,
    Online,
    Offline,
}

impl WorkerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "Starting",
            WorkerStatus::Online => "Online",
            WorkerStatus::Offline => "Offline",
        }
    }
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// One tracked agent session. Status, buffer and identity fields are owned by
/// the sync loop; role/label fields are set at creation by the UI and never
/// touched afterwards.
#[derive(Debug, Clone)]
pub struct Worker {
    /// Stable in-process identity, independent of list position and of
    /// whether the worker is resolved. UI state is keyed by this.
    pub serial: u64,
    /// Derived id shown in the table: "{handle}:{short element id}" once
    /// resolved, a placeholder before that.
    pub id: String,
    /// Terminal title the resolver searches for.
    pub display_title: String,
    pub role: String,
    pub project_path: Option<PathBuf>,
    /// Name matched against task-board recipients.
    pub kanban_label: String,
    pub start_time: Instant,
    pub handle: Option<WindowHandle>,
    pub element_id: Option<ElementId>,
    pub status: WorkerStatus,
    /// What the agent looks like it is doing, inferred from the buffer.
    pub activity: Activity,
    /// Most recent captured text; kept across empty ticks so the mirror does
    /// not flash blank while a background tab yields nothing.
    pub last_buffer: Option<String>,
    /// Transcript log, present once the worker has been promoted.
    pub log_path: Option<PathBuf>,
    /// When the last forced tab switch happened (cool-down clock).
    pub last_switch: Option<Instant>,
    /// Whether the last capture came from a cheap source (live/log/cache).
    pub cached: bool,
    pub hits: u64,
    pub walks: u64,
    /// Elapsed running time, formatted once per tick.
    pub elapsed: String,
}

impl Worker {
    pub fn new(display_title: impl Into<String>, role: impl Into<String>) -> Self {
        let display_title = display_title.into();
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            id: "-".to_string(),
            kanban_label: display_title.clone(),
            display_title,
            role: role.into(),
            project_path: None,
            start_time: Instant::now(),
            handle: None,
            element_id: None,
            status: WorkerStatus::default(),
            activity: Activity::default(),
            last_buffer: None,
            log_path: None,
            last_switch: None,
            cached: false,
            hits: 0,
            walks: 0,
            elapsed: "0m 0s".to_string(),
        }
    }

    pub fn with_project(mut self, path: PathBuf) -> Self {
        self.project_path = Some(path);
        self
    }

    pub fn identity(&self) -> Option<(WindowHandle, ElementId)> {
        match (self.handle, &self.element_id) {
            (Some(handle), Some(element_id)) => Some((handle, element_id.clone())),
            _ => None,
        }
    }

    pub fn assign_identity(&mut self, handle: WindowHandle, element_id: ElementId) {
        self.id = format!("{}:{}", handle, element_id.short());
        self.handle = Some(handle);
        self.element_id = Some(element_id);
    }

    /// Forget a stale binding so the next resolution pass can rebind (and so
    /// another worker can claim the freed identifier).
    pub fn clear_identity(&mut self) {
        self.handle = None;
        self.element_id = None;
        self.id = "-".to_string();
    }

    pub fn format_elapsed(elapsed: Duration) -> String {
        let total = elapsed.as_secs();
        format!("{}m {}s", total / 60, total % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_are_unique() {
        let a = Worker::new("one", "coder");
        let b = Worker::new("one", "coder");
        assert_ne!(a.serial, b.serial);
    }

    #[test]
    fn assign_identity_derives_id() {
        let mut worker = Worker::new("Agent_demo_coder", "coder");
        worker.assign_identity(WindowHandle(4242), ElementId("42.590.7".to_string()));
        assert_eq!(worker.id, "4242:7");
        assert!(worker.identity().is_some());

        worker.clear_identity();
        assert_eq!(worker.id, "-");
        assert!(worker.identity().is_none());
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(Worker::format_elapsed(Duration::from_secs(0)), "0m 0s");
        assert_eq!(Worker::format_elapsed(Duration::from_secs(222)), "3m 42s");
    }
}
