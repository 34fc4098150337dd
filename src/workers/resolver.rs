//! Identity Resolver: binds a logical worker to a live (window, tab) pair
//! from the latest registry snapshot.
//!
//! Resolution is sticky: a worker whose handle is still a live window keeps
//! its binding untouched. The `claimed` set is scoped to one resolution pass
//! and rebuilt every tick; within a pass an element id is assigned to at most
//! one worker, so two workers sharing the same terminal title can never alias
//! the same tab.

use std::collections::HashSet;

use crate::desktop::{Desktop, ElementId, WindowEntry};
use crate::workers::Worker;

/// Attempt to resolve one worker against the snapshot. Returns true only if
/// the worker was newly bound in this call.
pub fn resolve<D: Desktop>(
    desktop: &D,
    worker: &mut Worker,
    snapshot: &[WindowEntry],
    claimed: &mut HashSet<ElementId>,
) -> bool {
    if let Some(handle) = worker.handle {
        if desktop.is_window(handle) {
            // Still valid: keep the binding and claim its identifier so no
            // other worker grabs it later in the same pass.
            if let Some(element_id) = &worker.element_id {
                claimed.insert(element_id.clone());
            }
            return false;
        }
        // The window died; free the identifier for reclamation.
        worker.clear_identity();
    }

    for entry in snapshot {
        if entry.display_name == worker.display_title && !claimed.contains(&entry.element_id) {
            claimed.insert(entry.element_id.clone());
            worker.assign_identity(entry.handle, entry.element_id.clone());
            tracing::debug!(
                worker = %worker.display_title,
                id = %worker.id,
                "resolved worker to live tab"
            );
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::fake::{FakeDesktop, FakeWindow};
    use crate::desktop::WindowHandle;

    fn entry(name: &str, handle: isize, id: &str) -> WindowEntry {
        WindowEntry {
            display_name: name.to_string(),
            handle: WindowHandle(handle),
            element_id: ElementId(id.to_string()),
        }
    }

    #[test]
    fn two_workers_same_title_never_share_an_element() {
        let desktop = FakeDesktop::new();
        let snapshot = vec![entry("coder", 1, "tab.a"), entry("coder", 1, "tab.b")];
        let mut first = Worker::new("coder", "coder");
        let mut second = Worker::new("coder", "coder");
        let mut claimed = HashSet::new();

        assert!(resolve(&desktop, &mut first, &snapshot, &mut claimed));
        assert!(resolve(&desktop, &mut second, &snapshot, &mut claimed));
        assert_ne!(first.element_id, second.element_id);
    }

    #[test]
    fn one_entry_two_workers_leaves_the_loser_unresolved() {
        // Two workers titled the same, one matching tab: first come wins,
        // the other stays unresolved until another tab shows up.
        let desktop = FakeDesktop::new();
        let snapshot = vec![entry("build-agent", 1, "tab.a")];
        let mut first = Worker::new("build-agent", "builder");
        let mut second = Worker::new("build-agent", "builder");
        let mut claimed = HashSet::new();

        assert!(resolve(&desktop, &mut first, &snapshot, &mut claimed));
        assert!(!resolve(&desktop, &mut second, &snapshot, &mut claimed));
        assert!(first.identity().is_some());
        assert!(second.identity().is_none());
    }

    #[test]
    fn resolution_is_sticky_while_the_window_lives() {
        // A valid binding survives snapshot reordering and new entries
        // with the same title.
        let desktop = FakeDesktop::new();
        desktop.add_window(FakeWindow::new(1, "CASCADIA_HOSTING_WINDOW_CLASS", "host"));

        let mut worker = Worker::new("coder", "coder");
        let mut claimed = HashSet::new();
        assert!(resolve(
            &desktop,
            &mut worker,
            &[entry("coder", 1, "tab.a")],
            &mut claimed
        ));
        let bound = worker.element_id.clone();

        let shuffled = vec![entry("coder", 2, "tab.new"), entry("coder", 1, "tab.a")];
        let mut claimed = HashSet::new();
        assert!(!resolve(&desktop, &mut worker, &shuffled, &mut claimed));
        assert_eq!(worker.element_id, bound);
        // The kept identifier is claimed for the rest of the pass.
        assert!(claimed.contains(&bound.unwrap()));
    }

    #[test]
    fn dead_window_clears_identity_and_rebinds() {
        let desktop = FakeDesktop::new();
        let mut worker = Worker::new("coder", "coder");
        let mut claimed = HashSet::new();
        assert!(resolve(
            &desktop,
            &mut worker,
            &[entry("coder", 99, "tab.dead")],
            &mut claimed
        ));

        // Window 99 was never added to the fake, so it is not alive; the next
        // pass frees the stale binding and rebinds to the survivor.
        let mut claimed = HashSet::new();
        assert!(resolve(
            &desktop,
            &mut worker,
            &[entry("coder", 7, "tab.live")],
            &mut claimed
        ));
        assert_eq!(worker.handle, Some(WindowHandle(7)));
        assert_eq!(worker.element_id, Some(ElementId("tab.live".to_string())));
    }

    #[test]
    fn no_match_leaves_worker_unresolved() {
        let desktop = FakeDesktop::new();
        let mut worker = Worker::new("ghost", "coder");
        let mut claimed = HashSet::new();
        assert!(!resolve(
            &desktop,
            &mut worker,
            &[entry("other", 1, "tab.a")],
            &mut claimed
        ));
        assert!(worker.identity().is_none());
    }
}
