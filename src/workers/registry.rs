//! Window Registry: turns the raw desktop tree into a flat, deterministic
//! list of terminal surfaces (tabs, or whole windows when a host exposes no
//! tabs). Read-only and slow: callers take one snapshot per tick and share
//! it, and never call this on the UI thread.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::CaptureSettings;
use crate::desktop::{Desktop, DesktopResult, WindowEntry};

pub struct WindowRegistry<D: Desktop> {
    desktop: Arc<D>,
    settings: CaptureSettings,
}

impl<D: Desktop> WindowRegistry<D> {
    pub fn new(desktop: Arc<D>, settings: CaptureSettings) -> Self {
        Self { desktop, settings }
    }

    /// Enumerate every terminal surface currently on the desktop.
    ///
    /// A window whose tab walk fails is skipped, never fatal: one hung host
    /// must not blind us to the others. The result is deduplicated and sorted
    /// case-insensitively by display name so the picker renders stably.
    pub fn list_windows(&self) -> DesktopResult<Vec<WindowEntry>> {
        let windows = self.desktop.top_level_windows()?;
        let mut entries = Vec::new();

        for window in &windows {
            if !self.is_terminal_host(&window.class) {
                continue;
            }
            match self
                .desktop
                .tab_items(window.handle, self.settings.tab_walk_depth)
            {
                Ok(tabs) => {
                    let before = entries.len();
                    for tab in tabs {
                        if tab.name.is_empty() {
                            continue;
                        }
                        entries.push(WindowEntry {
                            display_name: tab.name,
                            handle: window.handle,
                            element_id: tab.element_id,
                        });
                    }
                    // Whole-window fallback for hosts without tab elements.
                    if entries.len() == before {
                        entries.push(WindowEntry {
                            display_name: window.title.clone(),
                            handle: window.handle,
                            element_id: window.element_id.clone(),
                        });
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        handle = %window.handle,
                        title = %window.title,
                        "skipping window during enumeration: {err}"
                    );
                }
            }
        }

        let mut seen = HashSet::new();
        entries.retain(|entry| seen.insert((entry.handle, entry.element_id.clone())));
        entries.sort_by_key(|entry| entry.display_name.to_lowercase());
        Ok(entries)
    }

    fn is_terminal_host(&self, class: &str) -> bool {
        self.settings
            .terminal_classes
            .iter()
            .any(|known| known == class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::fake::{FakeDesktop, FakeWindow};

    fn registry(desktop: Arc<FakeDesktop>) -> WindowRegistry<FakeDesktop> {
        WindowRegistry::new(desktop, CaptureSettings::default())
    }

    #[test]
    fn non_terminal_windows_are_ignored() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(FakeWindow::new(1, "Chrome_WidgetWin_1", "browser"));
        desktop.add_window(
            FakeWindow::new(2, "CASCADIA_HOSTING_WINDOW_CLASS", "host")
                .with_tab("Agent_demo_coder", "tab.1"),
        );

        let entries = registry(desktop).list_windows().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "Agent_demo_coder");
    }

    #[test]
    fn window_without_tabs_falls_back_to_itself() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(FakeWindow::new(7, "ConsoleWindowClass", "plain console"));

        let entries = registry(desktop).list_windows().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "plain console");
        assert_eq!(entries[0].element_id.0, "win.7");
    }

    #[test]
    fn failing_window_is_skipped_not_fatal() {
        let desktop = Arc::new(FakeDesktop::new());
        let mut bad = FakeWindow::new(1, "CASCADIA_HOSTING_WINDOW_CLASS", "bad");
        bad.tabs_fail = true;
        desktop.add_window(bad);
        desktop.add_window(
            FakeWindow::new(2, "CASCADIA_HOSTING_WINDOW_CLASS", "good").with_tab("agent", "tab.2"),
        );

        let entries = registry(desktop).list_windows().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "agent");
    }

    #[test]
    fn entries_are_sorted_case_insensitively_and_deduplicated() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            FakeWindow::new(3, "CASCADIA_HOSTING_WINDOW_CLASS", "host")
                .with_tab("zeta", "tab.z")
                .with_tab("Alpha", "tab.a")
                .with_tab("zeta", "tab.z"),
        );

        let entries = registry(desktop).list_windows().unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
    }

    #[test]
    fn unnamed_tabs_are_dropped() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            FakeWindow::new(4, "CASCADIA_HOSTING_WINDOW_CLASS", "host")
                .with_tab("", "tab.empty")
                .with_tab("named", "tab.named"),
        );

        let entries = registry(desktop).list_windows().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "named");
    }
}
