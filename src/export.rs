//! Local rendering and delivery of the conversation history.
//!
//! The backend export endpoint returns the downloadable document; this
//! module covers the client-side paths: rendering the same markdown shape
//! locally for clipboard copy, writing exported bytes to disk, and handing
//! text to the platform clipboard tool.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::{ParleyError, Result};
use crate::session::history::ChatEntry;

/// Platform clipboard tools tried in order; text is piped through stdin
const CLIPBOARD_TOOLS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
];

/// Render the history as the export markdown document.
///
/// One heading per entry with the message body and a duration/word-count
/// line, entries separated by rules.
pub fn render_markdown(entries: &[ChatEntry], exported_at: DateTime<Utc>) -> String {
    let mut doc = String::from("# Audio Tutor Chat History\n\n");
    doc.push_str(&format!(
        "Exported on: {}\n\n",
        exported_at.format("%Y-%m-%d %H:%M:%S")
    ));

    for entry in entries {
        doc.push_str(&format!("## {}\n\n", entry.speaker));
        doc.push_str(&format!("{}\n\n", entry.message));
        doc.push_str(&format!(
            "Duration: {}s | Words: {}\n\n",
            entry.duration_secs, entry.word_count
        ));
        doc.push_str("---\n\n");
    }

    doc
}

/// Write exported document bytes to disk
pub fn write_export(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)
        .map_err(|e| ParleyError::Export(format!("Failed to write {}: {}", path.display(), e)))?;
    debug!("export written to {}", path.display());
    Ok(())
}

/// Hand text to the first available platform clipboard tool
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    for (tool, args) in CLIPBOARD_TOOLS {
        let spawned = Command::new(tool)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                debug!("clipboard tool {} unavailable: {}", tool, e);
                continue;
            }
        };

        let written = child
            .stdin
            .take()
            .ok_or_else(|| ParleyError::Clipboard(format!("{} has no stdin", tool)))
            .and_then(|mut stdin| {
                stdin
                    .write_all(text.as_bytes())
                    .map_err(|e| ParleyError::Clipboard(e.to_string()))
            });

        if let Err(e) = written {
            warn!("failed to pipe text into {}: {}", tool, e);
            continue;
        }

        match child.wait() {
            Ok(status) if status.success() => {
                debug!("history copied via {}", tool);
                return Ok(());
            }
            Ok(status) => warn!("{} exited with {}", tool, status),
            Err(e) => warn!("failed to wait for {}: {}", tool, e),
        }
    }

    Err(ParleyError::Clipboard(
        "no clipboard tool available".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_the_export_document_shape() {
        let entries = vec![
            ChatEntry::user("hello there", 3),
            ChatEntry::tutor("Hi! How can I help?"),
        ];
        let exported_at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let doc = render_markdown(&entries, exported_at);

        assert!(doc.starts_with(
            "# Audio Tutor Chat History\n\nExported on: 2025-03-14 09:26:53\n\n"
        ));
        assert!(doc.contains("## You\n\nhello there\n\nDuration: 3s | Words: 2\n\n---\n\n"));
        assert!(doc.contains("## Tutor\n\nHi! How can I help?\n\nDuration: 0s | Words: 5\n\n---\n\n"));
    }

    #[test]
    fn empty_history_renders_header_only() {
        let exported_at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let doc = render_markdown(&[], exported_at);
        assert_eq!(
            doc,
            "# Audio Tutor Chat History\n\nExported on: 2025-03-14 09:26:53\n\n"
        );
    }

    #[test]
    fn entries_render_in_log_order() {
        let entries = vec![
            ChatEntry::user("first", 1),
            ChatEntry::tutor("second"),
            ChatEntry::user("third", 2),
        ];
        let doc = render_markdown(&entries, Utc::now());
        let first = doc.find("first").unwrap();
        let second = doc.find("second").unwrap();
        let third = doc.find("third").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn write_export_round_trips_bytes() {
        let dir = std::env::temp_dir().join(format!("parley-export-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("chat_history.md");

        write_export(&path, b"# doc").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"# doc");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn write_export_to_bad_path_is_an_export_error() {
        let path = Path::new("/nonexistent-parley-dir/chat_history.md");
        match write_export(path, b"doc") {
            Err(ParleyError::Export(message)) => assert!(message.contains("chat_history.md")),
            other => panic!("expected Export error, got {:?}", other),
        }
    }
}
