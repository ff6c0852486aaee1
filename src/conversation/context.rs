//! Context assembly: recent history as a plain-text block.

use crate::conversation::history::StoredMessage;

/// Timestamp layout used for each history line (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Render history as `"<yyyy-MM-dd HH:mm> - <text>"` lines joined by `\n`.
///
/// Input is expected oldest first. Embedded newlines in a message are kept
/// as-is, so one message may span several lines of output.
pub fn format_context(messages: &[StoredMessage]) -> String {
    messages
        .iter()
        .map(|message| {
            format!(
                "{} - {}",
                message.timestamp.format(TIMESTAMP_FORMAT),
                message.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};

    fn message(sequence: i64, text: &str, minute: u32) -> StoredMessage {
        StoredMessage {
            sequence,
            sender: "alice".into(),
            text: text.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 14, minute, 59).unwrap(),
        }
    }

    #[test]
    fn empty_history_formats_to_empty_string() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn single_message_has_no_trailing_newline() {
        let formatted = format_context(&[message(1, "hello", 5)]);
        assert_eq!(formatted, "2024-03-09 14:05 - hello");
    }

    #[test]
    fn lines_follow_input_order() {
        let formatted = format_context(&[message(1, "hello", 5), message(2, "how are you", 6)]);
        assert_eq!(
            formatted,
            "2024-03-09 14:05 - hello\n2024-03-09 14:06 - how are you"
        );
    }

    #[test]
    fn embedded_newlines_are_not_escaped() {
        let formatted = format_context(&[message(1, "line one\nline two", 0)]);
        assert_eq!(formatted, "2024-03-09 14:00 - line one\nline two");
        assert_eq!(formatted.lines().count(), 2);
    }
}
