//! Buffer Capture Engine: a strategy chain that tries, in strict priority
//! order, to read the text a worker's terminal is currently showing.
//!
//! 1. Live accessibility query, only for the confirmed active tab.
//! 2. Transcript log tail, once a worker has been promoted to logging.
//! 3. Cached element re-query: skip the tree walk when a previous tick
//!    found the text control.
//! 4. Forced switch-and-capture, which flashes the tab, so throttled per worker.
//! 5. Full re-walk as the last resort; caches whatever it finds for strategy 3.
//!
//! `None` out of the chain means "no text this tick" and is routine for
//! background tabs, not an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::CaptureSettings;
use crate::desktop::{Desktop, ElementId, TextCandidate, WindowHandle};
use crate::workers::injector::CommandInjector;
use crate::workers::transcript;

/// Which strategy produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    Live,
    Transcript,
    CachedElement,
    ForcedSwitch,
    Walk,
}

/// Everything the engine needs to know about one worker for one attempt.
/// The engine never touches `Worker` directly; the sync loop owns the state
/// and commits the outcome.
pub struct CaptureRequest<'a> {
    pub handle: WindowHandle,
    pub title: &'a str,
    pub element_id: &'a ElementId,
    pub log_path: Option<&'a Path>,
    pub last_switch: Option<Instant>,
}

#[derive(Debug)]
pub struct CaptureOutcome {
    pub text: Option<String>,
    pub source: Option<CaptureSource>,
    /// Set when this attempt promoted the worker to transcript logging.
    pub promoted: Option<PathBuf>,
    /// Set when a forced tab switch was performed (restarts the cool-down).
    pub switched: bool,
}

impl CaptureOutcome {
    /// Whether the text came from a cheap source (live/log/cache) as opposed
    /// to a switch or a full tree walk.
    pub fn hit(&self) -> bool {
        matches!(
            self.source,
            Some(CaptureSource::Live)
                | Some(CaptureSource::Transcript)
                | Some(CaptureSource::CachedElement)
        )
    }
}

pub struct CaptureEngine<D: Desktop> {
    desktop: Arc<D>,
    settings: CaptureSettings,
    /// Minimum time between forced switches for one worker.
    cooldown: Duration,
    injector: CommandInjector<D>,
    /// (window, tab) -> text control found by a previous full walk. Entries
    /// die with the element: any failed query evicts.
    cache: HashMap<(WindowHandle, ElementId), D::Element>,
}

impl<D: Desktop> CaptureEngine<D> {
    pub fn new(
        desktop: Arc<D>,
        settings: CaptureSettings,
        cooldown: Duration,
        injector: CommandInjector<D>,
    ) -> Self {
        Self {
            desktop,
            settings,
            cooldown,
            injector,
            cache: HashMap::new(),
        }
    }

    pub fn capture(&mut self, req: &CaptureRequest) -> CaptureOutcome {
        let key = (req.handle, req.element_id.clone());
        let mut promoted = None;
        let mut switched = false;

        // 1. Live query, only while this tab is visually frontmost. Also the
        // only point where promotion is allowed: injecting the transcript
        // command into anything but the confirmed active tab would leak
        // keystrokes into whatever is actually focused.
        match self.desktop.is_tab_selected(req.handle, req.element_id) {
            Ok(true) => {
                if req.log_path.is_none() {
                    promoted = self.promote(req);
                }
                if let Some(text) = self.live_capture(req.handle, req.title) {
                    return CaptureOutcome {
                        text: Some(text),
                        source: Some(CaptureSource::Live),
                        promoted,
                        switched,
                    };
                }
            }
            Ok(false) => {}
            Err(err) => {
                tracing::trace!(handle = %req.handle, "selection query failed: {err}");
            }
        }

        // 2. Transcript tail, usable regardless of tab visibility.
        if let Some(path) = req.log_path {
            if let Some(text) = transcript::tail(path, &self.settings) {
                return CaptureOutcome {
                    text: Some(text),
                    source: Some(CaptureSource::Transcript),
                    promoted,
                    switched,
                };
            }
        }

        // 3. Re-query the element cached by an earlier walk.
        if let Some(element) = self.cache.get(&key).cloned() {
            match self.desktop.query_text(&element) {
                Ok(Some(text)) => {
                    return CaptureOutcome {
                        text: Some(text),
                        source: Some(CaptureSource::CachedElement),
                        promoted,
                        switched,
                    };
                }
                Ok(None) | Err(_) => {
                    self.cache.remove(&key);
                }
            }
        }

        // 4. Forced switch-and-capture, at most once per cool-down; a
        // suppressed switch falls through to the re-walk instead.
        let cooled = req
            .last_switch
            .map_or(true, |at| at.elapsed() >= self.cooldown);
        if cooled {
            switched = true;
            if let Some(text) = self.switch_capture(req) {
                return CaptureOutcome {
                    text: Some(text),
                    source: Some(CaptureSource::ForcedSwitch),
                    promoted,
                    switched,
                };
            }
        }

        // 5. Unconditional fresh walk; cache the element for next tick.
        if let Some((element, text)) = self.walk_capture(req.handle, req.title) {
            self.cache.insert(key, element);
            return CaptureOutcome {
                text: Some(text),
                source: Some(CaptureSource::Walk),
                promoted,
                switched,
            };
        }

        CaptureOutcome {
            text: None,
            source: None,
            promoted,
            switched,
        }
    }

    fn live_capture(&self, handle: WindowHandle, title: &str) -> Option<String> {
        self.walk_capture(handle, title).map(|(_, text)| text)
    }

    fn walk_capture(&self, handle: WindowHandle, title: &str) -> Option<(D::Element, String)> {
        match self.desktop.window_texts(handle) {
            Ok(candidates) => self.pick_candidate(candidates, title),
            Err(err) => {
                tracing::trace!(%handle, "window text walk failed: {err}");
                None
            }
        }
    }

    /// A control whose name matches the configured terminal fragments wins
    /// outright; otherwise fall back to the longest text not belonging to an
    /// element named like the tab itself. Best effort: a host with several
    /// long panes can fool the fallback.
    fn pick_candidate(
        &self,
        candidates: Vec<(D::Element, TextCandidate)>,
        title: &str,
    ) -> Option<(D::Element, String)> {
        let mut best: Option<(D::Element, String)> = None;
        for (element, candidate) in candidates {
            if candidate.text.trim().len() <= self.settings.min_text_len {
                continue;
            }
            let control = candidate.control.to_lowercase();
            if self
                .settings
                .terminal_controls
                .iter()
                .any(|fragment| control.contains(&fragment.to_lowercase()))
            {
                return Some((element, candidate.text));
            }
            if candidate.control != title {
                let longer = best
                    .as_ref()
                    .map_or(true, |(_, text)| candidate.text.len() > text.len());
                if longer {
                    best = Some((element, candidate.text));
                }
            }
        }
        best
    }

    /// Select the target tab, capture it as if active, then put the
    /// previously selected tab back. Visible as a momentary tab flash. The
    /// element seen mid-switch is volatile and deliberately not cached.
    fn switch_capture(&mut self, req: &CaptureRequest) -> Option<String> {
        let previous = self.desktop.selected_tab(req.handle).ok().flatten();
        if let Err(err) = self.desktop.select_tab(req.handle, req.element_id) {
            tracing::trace!(handle = %req.handle, "forced switch failed: {err}");
            return None;
        }
        let text = self.live_capture(req.handle, req.title);
        if let Some(prev) = previous {
            if prev != *req.element_id {
                if let Err(err) = self.desktop.select_tab(req.handle, &prev) {
                    tracing::warn!(handle = %req.handle, "failed to restore tab after switch: {err}");
                }
            }
        }
        text
    }

    /// Start transcript logging in the target session so future background
    /// ticks can read the log instead of flashing tabs.
    fn promote(&self, req: &CaptureRequest) -> Option<PathBuf> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let log_path = std::env::temp_dir().join(format!(
            "promoted_{stamp}_{}.log",
            sanitize_title(req.title)
        ));
        let command = format!(
            "Start-Transcript -Path \"{}\" -Append; Clear-Host",
            log_path.display()
        );
        if self.injector.send(req.handle, &command) {
            tracing::info!(title = req.title, log = %log_path.display(), "promoted worker to transcript logging");
            Some(log_path)
        } else {
            None
        }
    }
}

fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::fake::{FakeDesktop, FakeWindow};
    use std::io::Write;

    const LIVE: &str = "live output from the active tab";
    const WALKED: &str = "text visible in the window right now";

    fn engine(desktop: &Arc<FakeDesktop>) -> CaptureEngine<FakeDesktop> {
        let injector = CommandInjector::new(Arc::clone(desktop), Duration::ZERO);
        CaptureEngine::new(
            Arc::clone(desktop),
            CaptureSettings::default(),
            Duration::from_secs(5),
            injector,
        )
    }

    fn request<'a>(
        element_id: &'a ElementId,
        log_path: Option<&'a Path>,
        last_switch: Option<Instant>,
    ) -> CaptureRequest<'a> {
        CaptureRequest {
            handle: WindowHandle(1),
            title: "coder",
            element_id,
            log_path,
            last_switch,
        }
    }

    fn terminal_window() -> FakeWindow {
        FakeWindow::new(1, "CASCADIA_HOSTING_WINDOW_CLASS", "host")
            .with_tab("coder", "tab.a")
            .with_tab("other", "tab.b")
    }

    #[test]
    fn live_query_wins_over_existing_transcript() {
        // When the tab is active, the live buffer beats a differing log.
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.a")
                .with_text("Windows PowerShell", LIVE),
        );

        let mut log = tempfile::NamedTempFile::new().unwrap();
        writeln!(log, "stale transcript content that differs").unwrap();
        log.flush().unwrap();

        let id = ElementId("tab.a".to_string());
        let outcome = engine(&desktop).capture(&request(&id, Some(log.path()), None));
        assert_eq!(outcome.source, Some(CaptureSource::Live));
        assert_eq!(outcome.text.as_deref(), Some(LIVE));
        assert!(outcome.hit());
    }

    #[test]
    fn inactive_tab_falls_back_to_transcript() {
        // Live query unavailable, so the log is read and cleaned of boilerplate.
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(terminal_window().with_selected("tab.b"));

        let mut log = tempfile::NamedTempFile::new().unwrap();
        write!(log, "AAAA\n**********************\nreal output\n").unwrap();
        log.flush().unwrap();

        let id = ElementId("tab.a".to_string());
        let outcome = engine(&desktop).capture(&request(&id, Some(log.path()), None));
        assert_eq!(outcome.source, Some(CaptureSource::Transcript));
        assert_eq!(outcome.text.as_deref(), Some("AAAA\nreal output"));
    }

    #[test]
    fn full_walk_caches_element_for_requery() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.b")
                .with_text("Windows PowerShell", WALKED),
        );

        let id = ElementId("tab.a".to_string());
        let mut engine = engine(&desktop);

        // First pass: cool-down ok, so the switch runs first and succeeds.
        let outcome = engine.capture(&request(&id, None, None));
        assert_eq!(outcome.source, Some(CaptureSource::ForcedSwitch));
        assert!(outcome.switched);

        // Second pass inside the cool-down: falls through to the walk, which
        // caches the element.
        let outcome = engine.capture(&request(&id, None, Some(Instant::now())));
        assert_eq!(outcome.source, Some(CaptureSource::Walk));
        assert!(!outcome.switched);

        // Third pass inside the cool-down: served straight from the cache.
        let outcome = engine.capture(&request(&id, None, Some(Instant::now())));
        assert_eq!(outcome.source, Some(CaptureSource::CachedElement));
        assert!(outcome.hit());
    }

    #[test]
    fn dead_cached_element_is_evicted() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.b")
                .with_text("Windows PowerShell", WALKED),
        );

        let id = ElementId("tab.a".to_string());
        let mut engine = engine(&desktop);
        let inside_cooldown = Some(Instant::now());

        let outcome = engine.capture(&request(&id, None, inside_cooldown));
        assert_eq!(outcome.source, Some(CaptureSource::Walk));

        // Kill the cached element: the re-query must evict and re-walk.
        for (element, _) in desktop.window_texts(WindowHandle(1)).unwrap() {
            desktop.kill_element(&element);
        }
        desktop.set_texts(WindowHandle(1), vec![]);
        let outcome = engine.capture(&request(&id, None, inside_cooldown));
        assert_eq!(outcome.text, None);
        assert_eq!(outcome.source, None);
    }

    #[test]
    fn forced_switch_is_throttled_by_cooldown() {
        // A second switch within the cool-down is suppressed and
        // the chain falls through instead of re-flashing the tab.
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.b")
                .with_text("Windows PowerShell", WALKED),
        );

        let id = ElementId("tab.a".to_string());
        let mut engine = engine(&desktop);

        let outcome = engine.capture(&request(&id, None, None));
        assert!(outcome.switched);
        let switches = desktop.select_calls().len();
        assert!(switches > 0);

        let outcome = engine.capture(&request(&id, None, Some(Instant::now())));
        assert!(!outcome.switched);
        assert_eq!(outcome.source, Some(CaptureSource::Walk));
        assert_eq!(desktop.select_calls().len(), switches);
    }

    #[test]
    fn forced_switch_restores_the_previous_tab() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.b")
                .with_text("Windows PowerShell", WALKED),
        );

        let id = ElementId("tab.a".to_string());
        let outcome = engine(&desktop).capture(&request(&id, None, None));
        assert_eq!(outcome.source, Some(CaptureSource::ForcedSwitch));

        let calls = desktop.select_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1 .0, "tab.a");
        assert_eq!(calls[1].1 .0, "tab.b");
        assert_eq!(
            desktop.selected_tab(WindowHandle(1)).unwrap(),
            Some(ElementId("tab.b".to_string()))
        );
    }

    #[test]
    fn active_worker_without_log_is_promoted() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.a")
                .with_text("Windows PowerShell", LIVE),
        );

        let id = ElementId("tab.a".to_string());
        let outcome = engine(&desktop).capture(&request(&id, None, None));
        assert!(outcome.promoted.is_some());
        let keys = desktop.sent_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].contains("Start-Transcript"));
    }

    #[test]
    fn background_tab_is_never_promoted() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.b")
                .with_text("Windows PowerShell", WALKED),
        );

        let id = ElementId("tab.a".to_string());
        let outcome = engine(&desktop).capture(&request(&id, None, None));
        assert!(outcome.promoted.is_none());
        assert!(desktop.sent_keys().is_empty());
    }

    #[test]
    fn tab_becoming_active_upgrades_to_live_capture() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            terminal_window()
                .with_selected("tab.b")
                .with_text("Windows PowerShell", WALKED),
        );

        let id = ElementId("tab.a".to_string());
        let mut engine = engine(&desktop);
        let inside_cooldown = Some(Instant::now());

        let outcome = engine.capture(&request(&id, None, inside_cooldown));
        assert_eq!(outcome.source, Some(CaptureSource::Walk));

        // The user clicks over to the worker's tab: live query takes over.
        desktop.set_selected(WindowHandle(1), Some("tab.a"));
        let outcome = engine.capture(&request(&id, None, inside_cooldown));
        assert_eq!(outcome.source, Some(CaptureSource::Live));
    }

    #[test]
    fn terminal_named_control_beats_longer_stray_text() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            FakeWindow::new(1, "CASCADIA_HOSTING_WINDOW_CLASS", "host")
                .with_tab("coder", "tab.a")
                .with_selected("tab.a")
                .with_text("coder", "the tab title pane with quite a lot of text in it")
                .with_text("Text Area", LIVE),
        );

        let id = ElementId("tab.a".to_string());
        let outcome = engine(&desktop).capture(&request(&id, None, None));
        assert_eq!(outcome.text.as_deref(), Some(LIVE));
    }

    #[test]
    fn whole_window_worker_counts_as_active() {
        let desktop = Arc::new(FakeDesktop::new());
        desktop.add_window(
            FakeWindow::new(9, "ConsoleWindowClass", "plain console")
                .with_text("Console", "standalone console buffer text"),
        );

        let id = ElementId("win.9".to_string());
        let req = CaptureRequest {
            handle: WindowHandle(9),
            title: "plain console",
            element_id: &id,
            log_path: None,
            last_switch: None,
        };
        let outcome = engine(&desktop).capture(&req);
        assert_eq!(outcome.source, Some(CaptureSource::Live));
    }
}
