//! Transcript tail reading for background capture. Reads a bounded window
//! from the end of a promoted worker's log, strips the host shell's
//! transcript boilerplate, and keeps the last screenful of lines.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::config::CaptureSettings;

/// Read the tail of a transcript log, cleaned for display. `None` means no
/// usable text this attempt (missing file, unreadable, or nothing left after
/// filtering); routine, not an error.
pub fn tail(path: &Path, settings: &CaptureSettings) -> Option<String> {
    let raw = match read_tail(path, settings.tail_bytes) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(path = %path.display(), "transcript read failed: {err}");
            return None;
        }
    };
    let cleaned = filter_lines(
        &raw,
        &settings.transcript_denylist,
        settings.viewport_lines,
    );
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Drop every line containing a denylist substring, keep the last
/// `viewport_lines` survivors. Idempotent: filtering an already-filtered
/// text changes nothing.
pub fn filter_lines(text: &str, denylist: &[String], viewport_lines: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !denylist.iter().any(|needle| line.contains(needle.as_str())))
        .collect();
    let start = lines.len().saturating_sub(viewport_lines);
    lines[start..].join("\n").trim().to_string()
}

/// Read at most `max_bytes` from the end of the file. PowerShell transcripts
/// are written either as UTF-8 or UTF-16LE depending on host version, so the
/// BOM decides the decoding. When the read starts mid-file the first
/// (partial) line is dropped.
fn read_tail(path: &Path, max_bytes: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut bom = [0u8; 2];
    let bom_read = file.read(&mut bom)?;
    let utf16 = bom_read == 2 && bom == [0xFF, 0xFE];

    let len = file.metadata()?.len();
    let mut start = len.saturating_sub(max_bytes);
    if utf16 && start % 2 != 0 {
        // Keep code-unit alignment; the BOM occupies bytes 0..2, so units
        // sit at even offsets.
        start += 1;
    }
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let mut text = if utf16 {
        let units: Vec<u16> = buf
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(&buf).into_owned()
    };

    if start > 0 {
        if let Some(pos) = text.find('\n') {
            text = text.split_off(pos + 1);
        }
    }
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn denylist() -> Vec<String> {
        CaptureSettings::default().transcript_denylist
    }

    #[test]
    fn boilerplate_lines_are_stripped_in_order() {
        // Surrounding content preserved, boilerplate gone.
        let text = "AAAA\n**********************\nreal output\n";
        let cleaned = filter_lines(text, &denylist(), 200);
        assert_eq!(cleaned, "AAAA\nreal output");
    }

    #[test]
    fn filtering_is_idempotent() {
        let text = "AAAA\n**********************\nWindows PowerShell transcript start\nreal output\n";
        let once = filter_lines(text, &denylist(), 200);
        let twice = filter_lines(&once, &denylist(), 200);
        assert_eq!(once, twice);
    }

    #[test]
    fn viewport_keeps_only_the_last_lines() {
        let text = (1..=10).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let cleaned = filter_lines(&text, &[], 3);
        assert_eq!(cleaned, "line 8\nline 9\nline 10");
    }

    #[test]
    fn tail_reads_only_the_requested_window() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for n in 0..1000 {
            writeln!(file, "line {n}").unwrap();
        }
        file.flush().unwrap();

        let text = read_tail(file.path(), 100).unwrap();
        assert!(text.contains("line 999"));
        assert!(!text.contains("line 0\n"));
        // The partial first line of the window was dropped.
        assert!(text.lines().all(|l| l.starts_with("line ")));
    }

    #[test]
    fn utf16_transcripts_decode() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello transcript\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let text = read_tail(file.path(), 1 << 16).unwrap();
        assert_eq!(text, "hello transcript\n");
    }

    #[test]
    fn missing_file_yields_none() {
        let settings = CaptureSettings::default();
        assert!(tail(Path::new("/definitely/not/here.log"), &settings).is_none());
    }

    #[test]
    fn fully_boilerplate_log_yields_none() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "**********************").unwrap();
        writeln!(file, "Windows PowerShell transcript start").unwrap();
        file.flush().unwrap();

        let settings = CaptureSettings::default();
        assert!(tail(file.path(), &settings).is_none());
    }
}
