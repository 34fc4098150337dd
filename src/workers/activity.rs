use once_cell::sync::Lazy;
use regex::Regex;

/// What a mirrored agent session looks like it is doing, inferred from the
/// tail of its captured buffer. Display enrichment only; liveness is
/// tracked separately by `WorkerStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    /// Agent is actively processing (spinning, thinking)
    Busy,
    /// Agent is idle, waiting at prompt
    Idle,
    /// Agent is waiting for user input (confirmation, question)
    WaitingForInput,
    /// Agent printed an error
    Error,
    /// Cannot be determined
    #[default]
    Unknown,
}

static RE_WAITING_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(^\s*>\s*$|Type a message|Press Enter|waiting for input|\? $|\[y/n\]|\(y/N\)|\(Y/n\))").unwrap()
});

static RE_BUSY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(Thinking\.{3}|Processing|Loading|Working|esc to interrupt|⠋|⠙|⠹|⠸|⠼|⠴|⠦|⠧|⠇|⠏|\.\.\.$)").unwrap()
});

static RE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(^Error:|^error:|Exception|FAILED|panic|fatal|crash)").unwrap()
});

static RE_IDLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(^\$\s*$|^❯\s*$|^>\s*$|^PS [^>]*>\s*$|gemini>)").unwrap()
});

impl Activity {
    /// Analyze the most recent lines of a captured buffer.
    pub fn infer(buffer: &str) -> Activity {
        // Only the last ~20 lines carry the current state
        let lines: Vec<&str> = buffer.lines().rev().take(20).collect();
        let recent = lines.into_iter().rev().collect::<Vec<_>>().join("\n");

        // Priority order: Error > WaitingForInput > Busy > Idle > Unknown
        if RE_ERROR.is_match(&recent) {
            return Activity::Error;
        }
        if RE_WAITING_INPUT.is_match(&recent) {
            return Activity::WaitingForInput;
        }
        if RE_BUSY.is_match(&recent) {
            return Activity::Busy;
        }
        if RE_IDLE.is_match(&recent) {
            return Activity::Idle;
        }
        Activity::Unknown
    }

    pub fn label(&self) -> &'static str {
        match self {
            Activity::Busy => "busy",
            Activity::Idle => "idle",
            Activity::WaitingForInput => "input?",
            Activity::Error => "error",
            Activity::Unknown => "-",
        }
    }
}
