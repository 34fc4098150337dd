//! Scripted in-memory desktop used by the unit tests. Windows, tabs,
//! selection state and text controls are plain data that tests mutate
//! between ticks to simulate the real tree changing underneath us.

use std::collections::HashSet;
use std::sync::Mutex;

use super::{
    Desktop, DesktopError, DesktopResult, ElementId, TabEntry, TextCandidate, TopLevelWindow,
    WindowHandle,
};

#[derive(Debug, Clone)]
pub struct FakeTab {
    pub name: String,
    pub element_id: ElementId,
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: WindowHandle,
    pub class: String,
    pub title: String,
    /// The window element's own runtime id (whole-window identity).
    pub element_id: ElementId,
    pub tabs: Vec<FakeTab>,
    pub selected: Option<ElementId>,
    /// Text controls currently exposed by the window (the visible buffer).
    pub texts: Vec<TextCandidate>,
    /// When set, `tab_items` fails for this window only.
    pub tabs_fail: bool,
}

impl FakeWindow {
    pub fn new(handle: isize, class: &str, title: &str) -> Self {
        Self {
            handle: WindowHandle(handle),
            class: class.to_string(),
            title: title.to_string(),
            element_id: ElementId(format!("win.{handle}")),
            tabs: Vec::new(),
            selected: None,
            texts: Vec::new(),
            tabs_fail: false,
        }
    }

    pub fn with_tab(mut self, name: &str, id: &str) -> Self {
        self.tabs.push(FakeTab {
            name: name.to_string(),
            element_id: ElementId(id.to_string()),
        });
        self
    }

    pub fn with_selected(mut self, id: &str) -> Self {
        self.selected = Some(ElementId(id.to_string()));
        self
    }

    pub fn with_text(mut self, control: &str, text: &str) -> Self {
        self.texts.push(TextCandidate {
            control: control.to_string(),
            text: text.to_string(),
        });
        self
    }
}

/// Element reference: an index into the owning window's text list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FakeElement {
    pub handle: WindowHandle,
    pub index: usize,
}

#[derive(Default)]
struct FakeState {
    windows: Vec<FakeWindow>,
    dead_elements: HashSet<FakeElement>,
    select_calls: Vec<(WindowHandle, ElementId)>,
    focus_calls: Vec<WindowHandle>,
    sent_keys: Vec<String>,
    focus_fails: bool,
    init_fails: bool,
    enumerations: usize,
}

#[derive(Default)]
pub struct FakeDesktop {
    state: Mutex<FakeState>,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&self, window: FakeWindow) {
        self.state.lock().unwrap().windows.push(window);
    }

    pub fn remove_window(&self, handle: WindowHandle) {
        self.state
            .lock()
            .unwrap()
            .windows
            .retain(|w| w.handle != handle);
    }

    pub fn set_selected(&self, handle: WindowHandle, tab: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        if let Some(w) = state.windows.iter_mut().find(|w| w.handle == handle) {
            w.selected = tab.map(|t| ElementId(t.to_string()));
        }
    }

    pub fn set_texts(&self, handle: WindowHandle, texts: Vec<TextCandidate>) {
        let mut state = self.state.lock().unwrap();
        if let Some(w) = state.windows.iter_mut().find(|w| w.handle == handle) {
            w.texts = texts;
        }
    }

    pub fn kill_element(&self, element: &FakeElement) {
        self.state
            .lock()
            .unwrap()
            .dead_elements
            .insert(element.clone());
    }

    pub fn set_focus_fails(&self, fails: bool) {
        self.state.lock().unwrap().focus_fails = fails;
    }

    pub fn set_init_fails(&self, fails: bool) {
        self.state.lock().unwrap().init_fails = fails;
    }

    pub fn select_calls(&self) -> Vec<(WindowHandle, ElementId)> {
        self.state.lock().unwrap().select_calls.clone()
    }

    pub fn focus_calls(&self) -> Vec<WindowHandle> {
        self.state.lock().unwrap().focus_calls.clone()
    }

    pub fn sent_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().sent_keys.clone()
    }

    pub fn enumerations(&self) -> usize {
        self.state.lock().unwrap().enumerations
    }
}

impl Desktop for FakeDesktop {
    type Element = FakeElement;

    fn init_thread(&self) -> DesktopResult<()> {
        if self.state.lock().unwrap().init_fails {
            Err(DesktopError::Init("scripted init failure".into()))
        } else {
            Ok(())
        }
    }

    fn top_level_windows(&self) -> DesktopResult<Vec<TopLevelWindow>> {
        let mut state = self.state.lock().unwrap();
        state.enumerations += 1;
        Ok(state
            .windows
            .iter()
            .map(|w| TopLevelWindow {
                handle: w.handle,
                class: w.class.clone(),
                title: w.title.clone(),
                element_id: w.element_id.clone(),
            })
            .collect())
    }

    fn tab_items(&self, handle: WindowHandle, _max_depth: u32) -> DesktopResult<Vec<TabEntry>> {
        let state = self.state.lock().unwrap();
        let window = state
            .windows
            .iter()
            .find(|w| w.handle == handle)
            .ok_or(DesktopError::WindowGone(handle))?;
        if window.tabs_fail {
            return Err(DesktopError::Query("scripted tab walk failure".into()));
        }
        Ok(window
            .tabs
            .iter()
            .map(|t| TabEntry {
                name: t.name.clone(),
                element_id: t.element_id.clone(),
            })
            .collect())
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        self.state
            .lock()
            .unwrap()
            .windows
            .iter()
            .any(|w| w.handle == handle)
    }

    fn is_tab_selected(&self, handle: WindowHandle, tab: &ElementId) -> DesktopResult<bool> {
        let state = self.state.lock().unwrap();
        let window = state
            .windows
            .iter()
            .find(|w| w.handle == handle)
            .ok_or(DesktopError::WindowGone(handle))?;
        if window.element_id == *tab {
            return Ok(true);
        }
        Ok(window.selected.as_ref() == Some(tab))
    }

    fn select_tab(&self, handle: WindowHandle, tab: &ElementId) -> DesktopResult<()> {
        let mut state = self.state.lock().unwrap();
        state.select_calls.push((handle, tab.clone()));
        let window = state
            .windows
            .iter_mut()
            .find(|w| w.handle == handle)
            .ok_or(DesktopError::WindowGone(handle))?;
        if window.tabs.iter().any(|t| t.element_id == *tab) || window.element_id == *tab {
            window.selected = Some(tab.clone());
            Ok(())
        } else {
            Err(DesktopError::Query("no such tab".into()))
        }
    }

    fn selected_tab(&self, handle: WindowHandle) -> DesktopResult<Option<ElementId>> {
        let state = self.state.lock().unwrap();
        let window = state
            .windows
            .iter()
            .find(|w| w.handle == handle)
            .ok_or(DesktopError::WindowGone(handle))?;
        Ok(window.selected.clone())
    }

    fn window_texts(&self, handle: WindowHandle) -> DesktopResult<Vec<(FakeElement, TextCandidate)>> {
        let state = self.state.lock().unwrap();
        let window = state
            .windows
            .iter()
            .find(|w| w.handle == handle)
            .ok_or(DesktopError::WindowGone(handle))?;
        Ok(window
            .texts
            .iter()
            .enumerate()
            .map(|(index, candidate)| (FakeElement { handle, index }, candidate.clone()))
            .collect())
    }

    fn query_text(&self, element: &FakeElement) -> DesktopResult<Option<String>> {
        let state = self.state.lock().unwrap();
        if state.dead_elements.contains(element) {
            return Err(DesktopError::Query("element died".into()));
        }
        let window = state
            .windows
            .iter()
            .find(|w| w.handle == element.handle)
            .ok_or(DesktopError::WindowGone(element.handle))?;
        match window.texts.get(element.index) {
            Some(candidate) if candidate.text.is_empty() => Ok(None),
            Some(candidate) => Ok(Some(candidate.text.clone())),
            None => Err(DesktopError::Query("element gone".into())),
        }
    }

    fn focus_window(&self, handle: WindowHandle) -> DesktopResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.focus_fails {
            return Err(DesktopError::Query("scripted focus failure".into()));
        }
        if !state.windows.iter().any(|w| w.handle == handle) {
            return Err(DesktopError::WindowGone(handle));
        }
        state.focus_calls.push(handle);
        Ok(())
    }

    fn send_keys(&self, text: &str) -> DesktopResult<()> {
        self.state.lock().unwrap().sent_keys.push(text.to_string());
        Ok(())
    }
}
