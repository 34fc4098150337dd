//! Command Injector: brings a worker's window to the foreground and types
//! into it. Steals OS input focus: the one capture/control path that is
//! visible to the user, so callers sequence it around the sync loop rather
//! than inside it.

use std::sync::Arc;
use std::time::Duration;

use crate::desktop::{Desktop, WindowHandle};

pub struct CommandInjector<D: Desktop> {
    desktop: Arc<D>,
    /// Pause after the focus transfer before the first keystroke, so the OS
    /// finishes routing input to the new foreground window.
    settle: Duration,
}

impl<D: Desktop> CommandInjector<D> {
    pub fn new(desktop: Arc<D>, settle: Duration) -> Self {
        Self { desktop, settle }
    }

    /// Forward `text` plus an end-of-line to the window. Returns false on any
    /// validation or injection failure; never panics or propagates.
    pub fn send(&self, handle: WindowHandle, text: &str) -> bool {
        if !self.desktop.is_window(handle) {
            tracing::warn!(%handle, "inject target is no longer a window");
            return false;
        }
        if let Err(err) = self.desktop.focus_window(handle) {
            tracing::warn!(%handle, "failed to focus inject target: {err}");
            return false;
        }
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        match self.desktop.send_keys(&format!("{text}\n")) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%handle, "keystroke injection failed: {err}");
                false
            }
        }
    }
}
