//! Line-level Server-Sent Events framing.
//!
//! The parser is stateless: callers hand it only text they have not parsed
//! before and track the consumed length themselves.

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Comment(String),
    Data(String),
    Terminator,
}

pub fn parse_new_frames(delta: &str) -> Vec<SseFrame> {
    delta.split('\n').filter_map(parse_line).collect()
}

/// Length of the prefix of `bytes` that ends in a line break. Bytes past it
/// belong to a line that is still arriving.
pub fn complete_lines_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map(|position| position + 1)
        .unwrap_or(0)
}

/// True when `text` opens like an SSE stream rather than a JSON document.
pub(crate) fn looks_like_sse(text: &str) -> bool {
    text.starts_with("data:") || text.starts_with(':')
}

fn parse_line(line: &str) -> Option<SseFrame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    if let Some(comment) = line.strip_prefix(':') {
        return Some(SseFrame::Comment(comment.trim_start().to_string()));
    }
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload == DONE_SENTINEL {
        return Some(SseFrame::Terminator);
    }
    Some(SseFrame::Data(payload.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_comment_and_terminator_lines() {
        let frames = parse_new_frames(": keep-alive\ndata: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Comment("keep-alive".to_string()),
                SseFrame::Data("{\"a\":1}".to_string()),
                SseFrame::Terminator,
            ]
        );
    }

    #[test]
    fn comment_mentioning_data_is_not_read_as_payload() {
        assert_eq!(
            parse_new_frames(":data: {\"x\":1}\n"),
            vec![SseFrame::Comment("data: {\"x\":1}".to_string())]
        );
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let frames = parse_new_frames("event: message\nid: 7\nretry: 100\ndata: x\n");
        assert_eq!(frames, vec![SseFrame::Data("x".to_string())]);
    }

    #[test]
    fn carriage_returns_are_stripped() {
        let frames = parse_new_frames("data: one\r\n\r\ndata: [DONE]\r\n");
        assert_eq!(
            frames,
            vec![SseFrame::Data("one".to_string()), SseFrame::Terminator]
        );
    }

    #[test]
    fn data_without_space_is_accepted() {
        assert_eq!(
            parse_new_frames("data:[DONE]\n"),
            vec![SseFrame::Terminator]
        );
    }

    #[test]
    fn done_must_match_exactly() {
        assert_eq!(
            parse_new_frames("data: [DONE] \n"),
            vec![SseFrame::Data("[DONE] ".to_string())]
        );
    }

    #[test]
    fn complete_lines_len_stops_at_last_newline() {
        assert_eq!(complete_lines_len(b"data: a\ndata: b"), 8);
        assert_eq!(complete_lines_len(b"data: a\n"), 8);
        assert_eq!(complete_lines_len(b"data: partial"), 0);
    }

    #[test]
    fn sse_detection_checks_prefix_only() {
        assert!(looks_like_sse("data: {}"));
        assert!(looks_like_sse(": ping"));
        assert!(!looks_like_sse("{\"choices\":[]}"));
    }
}
