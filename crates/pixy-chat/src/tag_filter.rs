//! Suppression of one marker-delimited block type from streamed text.
//!
//! Matching is an ASCII case-insensitive substring search, not a parser:
//! nested or unbalanced markers are handled greedily. A trailing fragment
//! that could be the start of the next marker is held back until the
//! following fragment (or [`TagFilter::flush`]) decides it, so splitting
//! the input at arbitrary offsets never changes the concatenated output.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOOL_BLOCK_OPEN: &str = "<tool_call>";
pub const DEFAULT_TOOL_BLOCK_CLOSE: &str = "</tool_call>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMarkers {
    pub open: String,
    pub close: String,
}

impl TagMarkers {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    /// Markers around literal tool-call text some models echo into content.
    pub fn tool_call_block() -> Self {
        Self::new(DEFAULT_TOOL_BLOCK_OPEN, DEFAULT_TOOL_BLOCK_CLOSE)
    }
}

impl Default for TagMarkers {
    fn default() -> Self {
        Self::tool_call_block()
    }
}

#[derive(Debug, Clone)]
pub struct TagFilter {
    markers: TagMarkers,
    inside: bool,
    held: String,
}

impl TagFilter {
    pub fn new(markers: TagMarkers) -> Self {
        Self {
            markers,
            inside: false,
            held: String::new(),
        }
    }

    pub fn is_inside(&self) -> bool {
        self.inside
    }

    /// Returns the visible part of `fragment`.
    pub fn filter(&mut self, fragment: &str) -> String {
        let mut text = std::mem::take(&mut self.held);
        text.push_str(fragment);

        let mut visible = String::new();
        let mut rest = text.as_str();
        loop {
            let marker = if self.inside {
                self.markers.close.as_str()
            } else {
                self.markers.open.as_str()
            };

            match find_ignore_ascii_case(rest, marker) {
                Some(position) => {
                    if !self.inside {
                        visible.push_str(&rest[..position]);
                    }
                    rest = &rest[position + marker.len()..];
                    self.inside = !self.inside;
                }
                None => {
                    let cut = rest.len() - partial_marker_suffix_len(rest, marker);
                    if !self.inside {
                        visible.push_str(&rest[..cut]);
                    }
                    self.held = rest[cut..].to_string();
                    break;
                }
            }
        }
        visible
    }

    /// Releases text held back as a possible marker prefix. Held text inside
    /// a block stays suppressed.
    pub fn flush(&mut self) -> String {
        let held = std::mem::take(&mut self.held);
        if self.inside { String::new() } else { held }
    }

    pub fn reset(&mut self) {
        self.inside = false;
        self.held.clear();
    }
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Length of the longest proper prefix of `marker` that ends `text`.
fn partial_marker_suffix_len(text: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    let longest = (marker.len() - 1).min(text.len());
    (1..=longest)
        .rev()
        .find(|&len| {
            let (Some(tail), Some(head)) = (text.get(text.len() - len..), marker.get(..len))
            else {
                return false;
            };
            tail.eq_ignore_ascii_case(head)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_filter() -> TagFilter {
        TagFilter::new(TagMarkers::tool_call_block())
    }

    #[test]
    fn fragment_without_markers_passes_through() {
        let mut filter = tool_filter();
        assert_eq!(filter.filter("plain text"), "plain text");
        assert!(!filter.is_inside());
    }

    #[test]
    fn complete_block_in_one_fragment_is_removed() {
        let mut filter = tool_filter();
        assert_eq!(
            filter.filter("before<tool_call>{\"name\":\"x\"}</tool_call>after"),
            "beforeafter"
        );
        assert!(!filter.is_inside());
    }

    #[test]
    fn open_marker_without_close_enters_block() {
        let mut filter = tool_filter();
        assert_eq!(filter.filter("keep <TOOL_CALL>{\"na"), "keep ");
        assert!(filter.is_inside());
        assert_eq!(filter.filter("me\":1}"), "");
        assert!(filter.is_inside());
        assert_eq!(filter.filter("}</Tool_Call> tail"), " tail");
        assert!(!filter.is_inside());
    }

    #[test]
    fn unrelated_bracketed_text_stays_visible() {
        let mut filter = tool_filter();
        assert_eq!(
            filter.filter("<think>plan</think> answer"),
            "<think>plan</think> answer"
        );
    }

    #[test]
    fn independent_marker_pairs_do_not_interfere() {
        let mut tools = tool_filter();
        let mut thinking = TagFilter::new(TagMarkers::new("<think>", "</think>"));
        let text = "<think>a</think>b<tool_call>c</tool_call>d";
        assert_eq!(tools.filter(text), "<think>a</think>bd");
        assert_eq!(thinking.filter(text), "b<tool_call>c</tool_call>d");
    }

    #[test]
    fn marker_split_across_fragments_is_detected() {
        let mut filter = tool_filter();
        assert_eq!(filter.filter("hi <tool_"), "hi ");
        assert_eq!(filter.filter("call>secret</tool"), "");
        assert_eq!(filter.filter("_call>!"), "!");
    }

    #[test]
    fn held_prefix_is_released_when_it_is_not_a_marker() {
        let mut filter = tool_filter();
        assert_eq!(filter.filter("a <to"), "a ");
        assert_eq!(filter.filter("p>"), "<top>");
        assert_eq!(filter.filter("x <"), "x ");
        assert_eq!(filter.flush(), "<");
    }

    #[test]
    fn split_fragments_match_single_pass() {
        let text = "Hello <tool_call>{\"a\":1}</tool_call> world <TOOL_CALL>x</tool_call>!";
        let mut whole = tool_filter();
        let expected = whole.filter(text) + &whole.flush();
        assert_eq!(expected, "Hello  world !");

        for split in 0..=text.len() {
            for second in split..=text.len() {
                let mut filter = tool_filter();
                let mut output = filter.filter(&text[..split]);
                output.push_str(&filter.filter(&text[split..second]));
                output.push_str(&filter.filter(&text[second..]));
                output.push_str(&filter.flush());
                assert_eq!(output, expected, "split at {split}/{second}");
            }
        }
    }

    #[test]
    fn empty_markers_never_match() {
        let mut filter = TagFilter::new(TagMarkers::new("", ""));
        assert_eq!(filter.filter("anything"), "anything");
        assert_eq!(filter.flush(), "");
    }

    #[test]
    fn non_ascii_text_keeps_char_boundaries() {
        let mut filter = tool_filter();
        assert_eq!(filter.filter("héllo <tool_call>ñ</tool_call> wörld"), "héllo  wörld");
    }
}
