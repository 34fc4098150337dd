use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    Desktop, DesktopError, DesktopResult, ElementId, TabEntry, TextCandidate, TopLevelWindow,
    WindowHandle,
};

/// Record/unit separators used by the window-texts script so multi-line
/// buffer text survives the subprocess boundary.
const RS: char = '\u{1e}';
const US: char = '\u{1f}';

/// Scripts signal "target window not found" with this exit code.
const EXIT_WINDOW_GONE: i32 = 2;
/// And "element not found inside a live window" with this one.
const EXIT_ELEMENT_GONE: i32 = 3;

const INIT_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
Write-Output "ok"
"#;

const LIST_WINDOWS_SCRIPT: &str = r#"
$OutputEncoding = [System.Text.Encoding]::UTF8
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
$root = [System.Windows.Automation.AutomationElement]::RootElement
$all = $root.FindAll([System.Windows.Automation.TreeScope]::Children, [System.Windows.Automation.Condition]::TrueCondition)
foreach ($item in $all) {
    try {
        $cur = $item.Current
        if ($cur.IsOffscreen) { continue }
        if (-not $cur.Name) { continue }
        $rid = ($item.GetRuntimeId() -join ".")
        Write-Output ("{0}`t{1}`t{2}`t{3}" -f [int64]$cur.NativeWindowHandle, $cur.ClassName, $rid, $cur.Name)
    } catch {}
}
"#;

const TAB_ITEMS_SCRIPT: &str = r#"
$OutputEncoding = [System.Text.Encoding]::UTF8
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NativeWindowHandleProperty, [int]$args[0])
$win = [System.Windows.Automation.AutomationElement]::RootElement.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { exit 2 }
$maxDepth = [int]$args[1]
$walker = [System.Windows.Automation.TreeWalker]::ControlViewWalker
$queue = New-Object System.Collections.Queue
$queue.Enqueue(@($win, 0))
while ($queue.Count -gt 0) {
    $pair = $queue.Dequeue()
    $node = $pair[0]
    $depth = $pair[1]
    if ($depth -ge $maxDepth) { continue }
    $child = $walker.GetFirstChild($node)
    while ($child -ne $null) {
        try {
            if ($child.Current.ControlType -eq [System.Windows.Automation.ControlType]::TabItem) {
                $rid = ($child.GetRuntimeId() -join ".")
                Write-Output ("{0}`t{1}" -f $rid, $child.Current.Name)
            } else {
                $queue.Enqueue(@($child, ($depth + 1)))
            }
        } catch {}
        $child = $walker.GetNextSibling($child)
    }
}
"#;

const IS_WINDOW_SCRIPT: &str = r#"
Add-Type -Namespace Native -Name User32 -MemberDefinition '[DllImport("user32.dll")] public static extern bool IsWindow(IntPtr hWnd);'
if ([Native.User32]::IsWindow([IntPtr][int64]$args[0])) { Write-Output "1" } else { Write-Output "0" }
"#;

const IS_TAB_SELECTED_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NativeWindowHandleProperty, [int]$args[0])
$win = [System.Windows.Automation.AutomationElement]::RootElement.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { exit 2 }
$target = $args[1]
if (($win.GetRuntimeId() -join ".") -eq $target) { Write-Output "1"; exit 0 }
$tabCond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::ControlTypeProperty, [System.Windows.Automation.ControlType]::TabItem)
$tabs = $win.FindAll([System.Windows.Automation.TreeScope]::Descendants, $tabCond)
foreach ($tab in $tabs) {
    if (($tab.GetRuntimeId() -join ".") -eq $target) {
        try {
            $pat = $tab.GetCurrentPattern([System.Windows.Automation.SelectionItemPattern]::Pattern)
            if ($pat.Current.IsSelected) { Write-Output "1" } else { Write-Output "0" }
        } catch { Write-Output "0" }
        exit 0
    }
}
Write-Output "0"
"#;

const SELECT_TAB_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NativeWindowHandleProperty, [int]$args[0])
$win = [System.Windows.Automation.AutomationElement]::RootElement.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { exit 2 }
$target = $args[1]
$tabCond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::ControlTypeProperty, [System.Windows.Automation.ControlType]::TabItem)
$tabs = $win.FindAll([System.Windows.Automation.TreeScope]::Descendants, $tabCond)
foreach ($tab in $tabs) {
    if (($tab.GetRuntimeId() -join ".") -eq $target) {
        $pat = $tab.GetCurrentPattern([System.Windows.Automation.SelectionItemPattern]::Pattern)
        $pat.Select()
        exit 0
    }
}
exit 3
"#;

const SELECTED_TAB_SCRIPT: &str = r#"
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NativeWindowHandleProperty, [int]$args[0])
$win = [System.Windows.Automation.AutomationElement]::RootElement.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { exit 2 }
$tabCond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::ControlTypeProperty, [System.Windows.Automation.ControlType]::TabItem)
$tabs = $win.FindAll([System.Windows.Automation.TreeScope]::Descendants, $tabCond)
foreach ($tab in $tabs) {
    try {
        $pat = $tab.GetCurrentPattern([System.Windows.Automation.SelectionItemPattern]::Pattern)
        if ($pat.Current.IsSelected) {
            Write-Output (($tab.GetRuntimeId() -join "."))
            exit 0
        }
    } catch {}
}
"#;

const WINDOW_TEXTS_SCRIPT: &str = r#"
$OutputEncoding = [System.Text.Encoding]::UTF8
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NativeWindowHandleProperty, [int]$args[0])
$win = [System.Windows.Automation.AutomationElement]::RootElement.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { exit 2 }
$rs = [char]0x1E
$us = [char]0x1F
$all = $win.FindAll([System.Windows.Automation.TreeScope]::Descendants, [System.Windows.Automation.Condition]::TrueCondition)
foreach ($item in $all) {
    try {
        $pattern = $item.GetCurrentPattern([System.Windows.Automation.TextPattern]::Pattern)
        if ($pattern -ne $null) {
            $text = $pattern.DocumentRange.GetText(-1)
            $rid = ($item.GetRuntimeId() -join ".")
            Write-Output ("{0}{1}{2}{3}{4}{5}" -f $rs, $rid, $us, $item.Current.Name, $us, $text)
        }
    } catch {}
}
"#;

const QUERY_TEXT_SCRIPT: &str = r#"
$OutputEncoding = [System.Text.Encoding]::UTF8
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
Add-Type -AssemblyName UIAutomationClient
Add-Type -AssemblyName UIAutomationTypes
$cond = New-Object System.Windows.Automation.PropertyCondition([System.Windows.Automation.AutomationElement]::NativeWindowHandleProperty, [int]$args[0])
$win = [System.Windows.Automation.AutomationElement]::RootElement.FindFirst([System.Windows.Automation.TreeScope]::Children, $cond)
if ($win -eq $null) { exit 2 }
$target = $args[1]
$all = $win.FindAll([System.Windows.Automation.TreeScope]::Descendants, [System.Windows.Automation.Condition]::TrueCondition)
foreach ($item in $all) {
    if (($item.GetRuntimeId() -join ".") -eq $target) {
        try {
            $pattern = $item.GetCurrentPattern([System.Windows.Automation.TextPattern]::Pattern)
            Write-Output ($pattern.DocumentRange.GetText(-1))
            exit 0
        } catch { exit 3 }
    }
}
exit 3
"#;

const FOCUS_WINDOW_SCRIPT: &str = r#"
Add-Type -Namespace Native -Name User32 -MemberDefinition @'
[DllImport("user32.dll")] public static extern bool IsWindow(IntPtr hWnd);
[DllImport("user32.dll")] public static extern bool IsIconic(IntPtr hWnd);
[DllImport("user32.dll")] public static extern bool ShowWindow(IntPtr hWnd, int nCmdShow);
[DllImport("user32.dll")] public static extern bool SetForegroundWindow(IntPtr hWnd);
'@
$hwnd = [IntPtr][int64]$args[0]
if (-not [Native.User32]::IsWindow($hwnd)) { exit 2 }
if ([Native.User32]::IsIconic($hwnd)) { [Native.User32]::ShowWindow($hwnd, 9) | Out-Null }
[Native.User32]::SetForegroundWindow($hwnd) | Out-Null
"#;

const SEND_KEYS_SCRIPT: &str = r#"
Add-Type -AssemblyName System.Windows.Forms
foreach ($chunk in $args) {
    [System.Windows.Forms.SendKeys]::SendWait($chunk)
    Start-Sleep -Milliseconds 15
}
"#;

/// Reference to a text-bearing control, re-findable by runtime id. UIA does
/// not allow conditions on runtime ids, so re-query is a walk that compares
/// ids rather than a tree-wide text extraction.
#[derive(Debug, Clone)]
pub struct PsElement {
    handle: WindowHandle,
    runtime_id: ElementId,
}

struct ScriptOutput {
    code: i32,
    stdout: String,
}

/// Desktop backend that drives the Windows UI Automation tree by shelling out
/// to `powershell.exe` with short scripts, one invocation per query. Slow
/// (each call pays a process spawn) but state-free: no in-process COM
/// apartment to manage, and a wedged query dies with its process.
pub struct PowerShellDesktop {
    /// Shell binary. Windows PowerShell, not pwsh: the UIAutomation
    /// assemblies ship with the .NET Framework only.
    shell: String,
    script_counter: AtomicU64,
}

impl PowerShellDesktop {
    pub fn new() -> DesktopResult<Self> {
        if !cfg!(windows) {
            return Err(DesktopError::Init(
                "the UI Automation backend requires a Windows desktop".into(),
            ));
        }
        Ok(Self {
            shell: "powershell".to_string(),
            script_counter: AtomicU64::new(0),
        })
    }

    fn script_path(&self) -> PathBuf {
        let n = self.script_counter.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("agent-deck-{}-{}.ps1", std::process::id(), n))
    }

    fn run(&self, script: &str, args: &[&str]) -> DesktopResult<ScriptOutput> {
        let path = self.script_path();
        std::fs::write(&path, script)?;

        let mut cmd = Command::new(&self.shell);
        cmd.args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-File"])
            .arg(&path)
            .args(args);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let output = cmd.output();
        let _ = std::fs::remove_file(&path);
        let output = output?;

        Ok(ScriptOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    /// Run a script against one window, mapping the sentinel exit codes.
    fn run_for_window(
        &self,
        script: &str,
        handle: WindowHandle,
        extra: &[&str],
    ) -> DesktopResult<String> {
        let handle_arg = handle.0.to_string();
        let mut args = vec![handle_arg.as_str()];
        args.extend_from_slice(extra);
        let out = self.run(script, &args)?;
        match out.code {
            0 => Ok(out.stdout),
            EXIT_WINDOW_GONE => Err(DesktopError::WindowGone(handle)),
            EXIT_ELEMENT_GONE => Err(DesktopError::Query("element not found".into())),
            code => Err(DesktopError::Query(format!("script exited with {code}"))),
        }
    }
}

impl Desktop for PowerShellDesktop {
    type Element = PsElement;

    fn init_thread(&self) -> DesktopResult<()> {
        // Probe once that the UIAutomation assemblies load; every later call
        // is its own process, so there is no per-thread state to keep alive.
        let out = self.run(INIT_SCRIPT, &[])?;
        if out.code == 0 && out.stdout.trim() == "ok" {
            Ok(())
        } else {
            Err(DesktopError::Init(format!(
                "UIAutomation probe exited with {}",
                out.code
            )))
        }
    }

    fn top_level_windows(&self) -> DesktopResult<Vec<TopLevelWindow>> {
        let out = self.run(LIST_WINDOWS_SCRIPT, &[])?;
        if out.code != 0 {
            return Err(DesktopError::Query(format!(
                "window enumeration exited with {}",
                out.code
            )));
        }
        let mut windows = Vec::new();
        for line in out.stdout.lines() {
            let mut parts = line.splitn(4, '\t');
            let (Some(handle), Some(class), Some(rid), Some(title)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let Ok(handle) = handle.trim().parse::<isize>() else {
                continue;
            };
            if handle == 0 || title.is_empty() {
                continue;
            }
            windows.push(TopLevelWindow {
                handle: WindowHandle(handle),
                class: class.to_string(),
                title: title.to_string(),
                element_id: ElementId(rid.to_string()),
            });
        }
        Ok(windows)
    }

    fn tab_items(&self, handle: WindowHandle, max_depth: u32) -> DesktopResult<Vec<TabEntry>> {
        let depth = max_depth.to_string();
        let stdout = self.run_for_window(TAB_ITEMS_SCRIPT, handle, &[depth.as_str()])?;
        let mut tabs = Vec::new();
        for line in stdout.lines() {
            if let Some((rid, name)) = line.split_once('\t') {
                tabs.push(TabEntry {
                    name: name.to_string(),
                    element_id: ElementId(rid.to_string()),
                });
            }
        }
        Ok(tabs)
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        let handle_arg = handle.0.to_string();
        match self.run(IS_WINDOW_SCRIPT, &[handle_arg.as_str()]) {
            Ok(out) => out.code == 0 && out.stdout.trim() == "1",
            Err(_) => false,
        }
    }

    fn is_tab_selected(&self, handle: WindowHandle, tab: &ElementId) -> DesktopResult<bool> {
        let stdout = self.run_for_window(IS_TAB_SELECTED_SCRIPT, handle, &[tab.0.as_str()])?;
        Ok(stdout.trim() == "1")
    }

    fn select_tab(&self, handle: WindowHandle, tab: &ElementId) -> DesktopResult<()> {
        self.run_for_window(SELECT_TAB_SCRIPT, handle, &[tab.0.as_str()])?;
        Ok(())
    }

    fn selected_tab(&self, handle: WindowHandle) -> DesktopResult<Option<ElementId>> {
        let stdout = self.run_for_window(SELECTED_TAB_SCRIPT, handle, &[])?;
        let rid = stdout.trim();
        if rid.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ElementId(rid.to_string())))
        }
    }

    fn window_texts(&self, handle: WindowHandle) -> DesktopResult<Vec<(PsElement, TextCandidate)>> {
        let stdout = self.run_for_window(WINDOW_TEXTS_SCRIPT, handle, &[])?;
        let mut candidates = Vec::new();
        for record in stdout.split(RS) {
            let record = record.trim_start_matches(['\r', '\n']);
            if record.is_empty() {
                continue;
            }
            let mut fields = record.splitn(3, US);
            let (Some(rid), Some(control), Some(text)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            candidates.push((
                PsElement {
                    handle,
                    runtime_id: ElementId(rid.to_string()),
                },
                TextCandidate {
                    control: control.to_string(),
                    text: text.trim_end_matches(['\r', '\n']).to_string(),
                },
            ));
        }
        Ok(candidates)
    }

    fn query_text(&self, element: &PsElement) -> DesktopResult<Option<String>> {
        let stdout = self.run_for_window(
            QUERY_TEXT_SCRIPT,
            element.handle,
            &[element.runtime_id.0.as_str()],
        )?;
        let text = stdout.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text.to_string()))
        }
    }

    fn focus_window(&self, handle: WindowHandle) -> DesktopResult<()> {
        self.run_for_window(FOCUS_WINDOW_SCRIPT, handle, &[])?;
        Ok(())
    }

    fn send_keys(&self, text: &str) -> DesktopResult<()> {
        let chunks = escape_sendkeys(text);
        if chunks.is_empty() {
            return Ok(());
        }
        let args: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let out = self.run(SEND_KEYS_SCRIPT, &args)?;
        if out.code == 0 {
            Ok(())
        } else {
            Err(DesktopError::Query(format!(
                "send-keys exited with {}",
                out.code
            )))
        }
    }
}

/// Maximum SendKeys tokens per chunk; the script sleeps between chunks so
/// long pastes type at a bounded rate instead of one burst.
const CHUNK_TOKENS: usize = 24;

/// Translate plain text into SendKeys syntax, split into pacing chunks.
/// Newlines become {ENTER}; SendKeys metacharacters are brace-escaped.
fn escape_sendkeys(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut tokens = 0;

    let push_token = |chunks: &mut Vec<String>, current: &mut String, tokens: &mut usize, token: &str| {
        current.push_str(token);
        *tokens += 1;
        if *tokens >= CHUNK_TOKENS {
            chunks.push(std::mem::take(current));
            *tokens = 0;
        }
    };

    for ch in text.chars() {
        match ch {
            '\n' => push_token(&mut chunks, &mut current, &mut tokens, "{ENTER}"),
            '\r' => {}
            '\t' => push_token(&mut chunks, &mut current, &mut tokens, "{TAB}"),
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                push_token(&mut chunks, &mut current, &mut tokens, &format!("{{{ch}}}"))
            }
            _ => push_token(&mut chunks, &mut current, &mut tokens, &ch.to_string()),
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
