mod powershell;

#[cfg(test)]
pub mod fake;

pub use powershell::PowerShellDesktop;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque top-level window handle. Stable only while the window exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accessibility runtime id rendered as a dotted string (e.g. "42.590414.4").
/// Distinguishes tabs inside one window; stable within a desktop session only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub String);

impl ElementId {
    /// Short form used when deriving worker ids: the last dotted segment,
    /// or the first 8 characters when the id has no separator.
    pub fn short(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((_, tail)) if !tail.is_empty() => tail,
            _ => {
                let end = self.0.len().min(8);
                &self.0[..end]
            }
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discoverable terminal surface: a tab inside a host window, or a whole
/// window when the host exposes no tabs. Produced fresh on every enumeration,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    /// Visible tab or window title.
    pub display_name: String,
    pub handle: WindowHandle,
    pub element_id: ElementId,
}

/// A visible top-level window as reported by the desktop.
#[derive(Debug, Clone)]
pub struct TopLevelWindow {
    pub handle: WindowHandle,
    /// OS window class, used to recognize terminal hosts.
    pub class: String,
    pub title: String,
    /// Runtime id of the window element itself (whole-window fallback identity).
    pub element_id: ElementId,
}

/// A tab item discovered inside a host window.
#[derive(Debug, Clone)]
pub struct TabEntry {
    pub name: String,
    pub element_id: ElementId,
}

/// A text-bearing control found during a window walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCandidate {
    /// Accessible name of the control (e.g. "Windows PowerShell").
    pub control: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum DesktopError {
    #[error("accessibility session init failed: {0}")]
    Init(String),
    #[error("accessibility query failed: {0}")]
    Query(String),
    #[error("window {0} is gone")]
    WindowGone(WindowHandle),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DesktopResult<T> = Result<T, DesktopError>;

/// Capability seam over the desktop accessibility subsystem.
///
/// Everything that touches live windows goes through this trait so the
/// discovery/capture logic stays platform-neutral and unit-testable against a
/// scripted fake. Calls may block for tens to hundreds of milliseconds and
/// must never run on the UI thread.
///
/// `Element` is an opaque reference to a text-bearing control, valid until the
/// underlying UI element dies. Callers cache it to skip tree re-walks and drop
/// it the moment a query against it fails.
pub trait Desktop: Send + Sync {
    type Element: Clone + Send;

    /// Per-thread session initialization. Must be called once on every thread
    /// that performs queries, before any other call. A failure here is fatal
    /// for that thread's querying ability.
    fn init_thread(&self) -> DesktopResult<()>;

    /// All visible, titled top-level windows.
    fn top_level_windows(&self) -> DesktopResult<Vec<TopLevelWindow>>;

    /// Tab items inside a host window, walking at most `max_depth` levels.
    fn tab_items(&self, handle: WindowHandle, max_depth: u32) -> DesktopResult<Vec<TabEntry>>;

    /// Whether the handle still denotes a live window. Infallible by design:
    /// any failure to answer means the window is not usable.
    fn is_window(&self, handle: WindowHandle) -> bool;

    /// Whether the given tab is the currently selected one in its host
    /// window. A whole-window identity (no tabs) counts as selected while the
    /// window exists.
    fn is_tab_selected(&self, handle: WindowHandle, tab: &ElementId) -> DesktopResult<bool>;

    /// Programmatically select a tab. Visible to the user (tab flash).
    fn select_tab(&self, handle: WindowHandle, tab: &ElementId) -> DesktopResult<()>;

    /// Runtime id of the currently selected tab, if the window has tabs.
    fn selected_tab(&self, handle: WindowHandle) -> DesktopResult<Option<ElementId>>;

    /// Fresh walk of the window's accessibility tree collecting every
    /// text-bearing control together with an element reference for it.
    fn window_texts(
        &self,
        handle: WindowHandle,
    ) -> DesktopResult<Vec<(Self::Element, TextCandidate)>>;

    /// Re-query a previously returned element without walking the tree.
    /// `Ok(None)` means the element exists but currently has no text.
    fn query_text(&self, element: &Self::Element) -> DesktopResult<Option<String>>;

    /// Restore the window if minimized and bring it to the foreground.
    /// Steals OS input focus.
    fn focus_window(&self, handle: WindowHandle) -> DesktopResult<()>;

    /// Forward text to the focused window as synthesized keystrokes at a
    /// bounded typing rate. A '\n' in the text is sent as Enter.
    fn send_keys(&self, text: &str) -> DesktopResult<()>;
}
