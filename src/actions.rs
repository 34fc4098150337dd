use crossterm::event::KeyEvent;

use crate::desktop::{ElementId, WindowEntry, WindowHandle};
use crate::kanban::Assignment;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// The sync loop changed worker state; the table should be re-pulled
    WorkersUpdated,
    /// A worker's visible buffer changed
    BufferCaptured(WindowHandle, ElementId, String),
    /// Fresh assignment list from the task board
    AssignmentsUpdated(Vec<Assignment>),
    /// Result of a window enumeration for the connect picker
    WindowsListed(Vec<WindowEntry>),
    /// An error occurred
    Error(String),
    /// Informational message for the footer
    Info(String),
    /// Request to quit the application
    Quit,
    /// Send a command line to the worker with this serial
    SendCommand(u64, String),
    /// Spawn a new worker with the given role
    SpawnWorker(String),
    /// Track a worker bound to a manually picked window
    ConnectWindow(WindowEntry),
    /// Stop tracking the worker with this serial
    DisconnectWorker(u64),
    /// Ask for a fresh window enumeration
    RefreshWindows,
    /// Copy the mirrored buffer to the clipboard
    CopyBuffer,
}
