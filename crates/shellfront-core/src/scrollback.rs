//! Bounded scrollback: the persisted log of past command/output rows.
//!
//! Entries arrive in order and are grouped by their prompt index (output rows
//! carry the index of the command that produced them). Two invariants hold
//! after every apply:
//!
//! - at most `max_commands` prompt-bearing entries,
//! - at most `max_lines` plain output entries,
//!
//! and eviction never drops rows silently: each eviction pass leaves exactly
//! one collapsed `"..."` marker at the truncation boundary. A marker never
//! moves once placed; repeat-prompt consolidation removes the repeated
//! group's rows but leaves markers where they are.
//!
//! The buffer doubles as the command log for history recall via
//! [`CommandSource`].

use std::collections::VecDeque;

use crate::history::CommandSource;
use crate::ops::DisplayOp;
use crate::protocol::RowKind;

/// Maximum prompt-bearing entries retained.
pub const MAX_COMMAND_BUFFER: usize = 100;
/// Maximum plain output entries retained.
pub const MAX_LINE_BUFFER: usize = 500;

/// Visible text of the truncation marker row.
pub const TRUNCATION_MARKER: &str = "...";

/// One retained scrollback row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollEntry {
    /// Index of the command this row belongs to.
    pub prompt_index: u64,
    /// Non-zero when the row is the command line itself.
    pub prompt_offset: usize,
    pub kind: RowKind,
    pub line_text: String,
    /// Server-rendered markup, when the row is a pagelet/markdown block.
    pub markup: Option<String>,
    /// Truncation marker row; excluded from both caps and from grouping.
    pub is_marker: bool,
}

impl ScrollEntry {
    /// Whether this entry is a live command line.
    #[must_use]
    pub fn has_prompt(&self) -> bool {
        self.prompt_offset > 0 && !self.is_marker
    }

    /// Whether this entry counts against the output-line cap.
    fn is_output(&self) -> bool {
        !self.is_marker && self.prompt_offset == 0
    }

    fn marker() -> Self {
        Self {
            prompt_index: 0,
            prompt_offset: 0,
            kind: RowKind::Text,
            line_text: TRUNCATION_MARKER.to_string(),
            markup: None,
            is_marker: true,
        }
    }
}

/// Bounded, ordered scrollback log.
#[derive(Debug, Clone)]
pub struct ScrollBuffer {
    entries: VecDeque<ScrollEntry>,
    /// Prompt index of the most recently applied entry; used to detect
    /// repeats (incremental output re-sent for the same command).
    prompt_index: u64,
    max_commands: usize,
    max_lines: usize,
}

impl Default for ScrollBuffer {
    fn default() -> Self {
        Self::new(MAX_COMMAND_BUFFER, MAX_LINE_BUFFER)
    }
}

impl ScrollBuffer {
    /// Create a buffer with explicit caps (both must be at least 1).
    #[must_use]
    pub fn new(max_commands: usize, max_lines: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            prompt_index: 0,
            max_commands: max_commands.max(1),
            max_lines: max_lines.max(1),
        }
    }

    /// Prompt index of the newest applied entry (0 before any).
    #[must_use]
    pub fn prompt_index(&self) -> u64 {
        self.prompt_index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained prompt-bearing entries.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.entries.iter().filter(|e| e.has_prompt()).count()
    }

    /// Retained plain output entries (markers excluded).
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_output()).count()
    }

    /// Iterate entries oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ScrollEntry> {
        self.entries.iter()
    }

    /// Apply one incoming entry, emitting the display mutations in order:
    /// repeat consolidation or eviction first, then the append. `rendered`
    /// is the final markup the sink should append for this entry.
    pub fn apply(&mut self, entry: ScrollEntry, rendered: String, ops: &mut Vec<DisplayOp>) {
        debug_assert!(!entry.is_marker);
        let is_prompt = entry.prompt_offset > 0;

        if is_prompt && entry.prompt_index == self.prompt_index {
            // Same command again: the server re-sent the whole group to
            // consolidate incremental output. Markers stay put.
            let before = self.entries.len();
            let repeated = entry.prompt_index;
            self.entries
                .retain(|e| e.is_marker || e.prompt_index != repeated);
            if self.entries.len() != before {
                ops.push(DisplayOp::RemoveScrollGroup {
                    prompt_index: repeated,
                });
            }
        } else {
            self.evict(is_prompt, ops);
        }

        self.prompt_index = entry.prompt_index;
        ops.push(DisplayOp::AppendScroll {
            prompt_index: entry.prompt_index,
            kind: entry.kind,
            markup: rendered,
            is_prompt,
        });
        self.entries.push_back(entry);
    }

    /// Enforce both caps, counting the entry about to be appended, and leave
    /// a single truncation marker at the boundary of whatever was removed.
    fn evict(&mut self, incoming_prompt: bool, ops: &mut Vec<DisplayOp>) {
        let mut removed_any = false;
        let mut boundary: Option<usize> = None;

        // Whole prompt-groups first: a command line plus its contiguous
        // output rows (they share its prompt index).
        let incoming_prompts = usize::from(incoming_prompt);
        while self.prompt_count() + incoming_prompts > self.max_commands {
            let Some(start) = self.entries.iter().position(ScrollEntry::has_prompt) else {
                break;
            };
            let group_index = self.entries[start].prompt_index;
            let mut end = start + 1;
            while end < self.entries.len()
                && !self.entries[end].is_marker
                && self.entries[end].prompt_index == group_index
            {
                end += 1;
            }
            self.entries.drain(start..end);
            ops.push(DisplayOp::RemoveScrollRange {
                start,
                count: end - start,
            });
            removed_any = true;
            boundary.get_or_insert(start);
        }

        // Output-line cap, independent of the command cap.
        let incoming_lines = usize::from(!incoming_prompt);
        let mut excess = (self.line_count() + incoming_lines).saturating_sub(self.max_lines);
        while excess > 0 {
            let Some(start) = self.entries.iter().position(ScrollEntry::is_output) else {
                break;
            };
            let mut end = start;
            while end < self.entries.len() && excess > 0 && self.entries[end].is_output() {
                end += 1;
                excess -= 1;
            }
            self.entries.drain(start..end);
            ops.push(DisplayOp::RemoveScrollRange {
                start,
                count: end - start,
            });
            removed_any = true;
            boundary.get_or_insert(start);
        }

        if removed_any {
            let at = boundary.unwrap_or(0).min(self.entries.len());
            let next_is_marker = self.entries.get(at).is_some_and(|e| e.is_marker);
            let prev_is_marker = at > 0 && self.entries[at - 1].is_marker;
            if !next_is_marker && !prev_is_marker {
                self.entries.insert(at, ScrollEntry::marker());
                ops.push(DisplayOp::InsertScrollMarker { index: at });
            }
        }
    }
}

/// Derive the typed command from a logged command line: everything past the
/// prompt offset, non-breaking spaces normalized, trailing newline chopped.
fn command_from_line(line: &str, prompt_offset: usize) -> String {
    let cmd: String = line
        .chars()
        .skip(prompt_offset)
        .map(|ch| if ch == '\u{a0}' { ' ' } else { ch })
        .collect();
    cmd.trim_end_matches('\n').to_string()
}

impl CommandSource for ScrollBuffer {
    fn first_prompt_index(&self) -> u64 {
        self.entries
            .iter()
            .find(|e| e.has_prompt())
            .map_or(0, |e| e.prompt_index)
    }

    fn command_text(&self, prompt_index: u64) -> Option<String> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.has_prompt() && e.prompt_index == prompt_index)
            .map(|e| command_from_line(&e.line_text, e.prompt_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prompt_entry(index: u64, cmd: &str) -> ScrollEntry {
        ScrollEntry {
            prompt_index: index,
            prompt_offset: 6,
            kind: RowKind::Text,
            line_text: format!("bash$ {cmd}"),
            markup: None,
            is_marker: false,
        }
    }

    fn output_entry(index: u64, text: &str) -> ScrollEntry {
        ScrollEntry {
            prompt_index: index,
            prompt_offset: 0,
            kind: RowKind::Text,
            line_text: text.to_string(),
            markup: None,
            is_marker: false,
        }
    }

    fn marker_count(buffer: &ScrollBuffer) -> usize {
        buffer.iter().filter(|e| e.is_marker).count()
    }

    #[test]
    fn entries_append_in_arrival_order() {
        let mut buffer = ScrollBuffer::default();
        let mut ops = Vec::new();
        buffer.apply(prompt_entry(1, "ls"), String::new(), &mut ops);
        buffer.apply(output_entry(1, "src"), String::new(), &mut ops);
        buffer.apply(prompt_entry(2, "make"), String::new(), &mut ops);

        let lines: Vec<&str> = buffer.iter().map(|e| e.line_text.as_str()).collect();
        assert_eq!(lines, ["bash$ ls", "src", "bash$ make"]);
        assert_eq!(buffer.prompt_index(), 2);
        assert_eq!(buffer.prompt_count(), 2);
        assert_eq!(buffer.line_count(), 1);
    }

    #[test]
    fn repeated_prompt_index_replaces_the_group() {
        let mut buffer = ScrollBuffer::default();
        let mut ops = Vec::new();
        buffer.apply(prompt_entry(1, "tail -f log"), String::new(), &mut ops);
        buffer.apply(output_entry(1, "line one"), String::new(), &mut ops);

        ops.clear();
        buffer.apply(prompt_entry(1, "tail -f log"), String::new(), &mut ops);
        buffer.apply(output_entry(1, "line one"), String::new(), &mut ops);
        buffer.apply(output_entry(1, "line two"), String::new(), &mut ops);

        assert_eq!(
            ops[0],
            DisplayOp::RemoveScrollGroup { prompt_index: 1 }
        );
        let lines: Vec<&str> = buffer.iter().map(|e| e.line_text.as_str()).collect();
        assert_eq!(lines, ["bash$ tail -f log", "line one", "line two"]);
        assert_eq!(buffer.prompt_count(), 1);
    }

    #[test]
    fn command_cap_evicts_oldest_prompt_group() {
        // 101 commands, each with output rows: the oldest whole group goes.
        let mut buffer = ScrollBuffer::default();
        let mut ops = Vec::new();
        for index in 1..=101u64 {
            buffer.apply(prompt_entry(index, "ls"), String::new(), &mut ops);
            buffer.apply(output_entry(index, "a"), String::new(), &mut ops);
            buffer.apply(output_entry(index, "b"), String::new(), &mut ops);
        }

        assert_eq!(buffer.prompt_count(), MAX_COMMAND_BUFFER);
        assert_eq!(buffer.first_prompt_index(), 2);
        // Nothing of command 1 survives, and the cut is visibly marked.
        assert!(buffer.iter().all(|e| e.is_marker || e.prompt_index != 1));
        assert!(buffer.iter().next().is_some_and(|e| e.is_marker));
        assert_eq!(marker_count(&buffer), 1);
    }

    #[test]
    fn line_cap_trims_oldest_output_and_marks_once() {
        let mut buffer = ScrollBuffer::new(100, 10);
        let mut ops = Vec::new();
        buffer.apply(prompt_entry(1, "cat big"), String::new(), &mut ops);
        for n in 0..12u64 {
            buffer.apply(output_entry(1, &format!("line {n}")), String::new(), &mut ops);
        }

        assert_eq!(buffer.line_count(), 10);
        assert_eq!(buffer.prompt_count(), 1);
        // The prompt row survives; the marker sits where output was cut.
        assert!(buffer.iter().next().is_some_and(ScrollEntry::has_prompt));
        assert_eq!(marker_count(&buffer), 1);
        let position = buffer.iter().position(|e| e.is_marker);
        assert_eq!(position, Some(1));
    }

    #[test]
    fn consolidation_never_displaces_a_marker() {
        let mut buffer = ScrollBuffer::new(2, 500);
        let mut ops = Vec::new();
        buffer.apply(prompt_entry(1, "a"), String::new(), &mut ops);
        buffer.apply(prompt_entry(2, "b"), String::new(), &mut ops);
        buffer.apply(prompt_entry(3, "c"), String::new(), &mut ops);
        assert_eq!(marker_count(&buffer), 1);

        // Repeat of the group right at the truncation boundary.
        ops.clear();
        buffer.apply(prompt_entry(3, "c"), String::new(), &mut ops);
        assert_eq!(marker_count(&buffer), 1);
        assert!(buffer.iter().next().is_some_and(|e| e.is_marker));
    }

    #[test]
    fn second_eviction_pass_does_not_stack_markers() {
        let mut buffer = ScrollBuffer::new(1, 500);
        let mut ops = Vec::new();
        buffer.apply(prompt_entry(1, "a"), String::new(), &mut ops);
        buffer.apply(prompt_entry(2, "b"), String::new(), &mut ops);
        buffer.apply(prompt_entry(3, "c"), String::new(), &mut ops);
        buffer.apply(prompt_entry(4, "d"), String::new(), &mut ops);

        // Each pass truncates at the same front boundary: one marker total.
        assert_eq!(marker_count(&buffer), 1);
        assert_eq!(buffer.prompt_count(), 1);
    }

    #[test]
    fn command_text_reads_through_the_prompt_offset() {
        let mut buffer = ScrollBuffer::default();
        let mut ops = Vec::new();
        buffer.apply(prompt_entry(7, "grep -r \u{a0}foo\n"), String::new(), &mut ops);

        assert_eq!(buffer.command_text(7).as_deref(), Some("grep -r  foo"));
        assert_eq!(buffer.command_text(8), None);
        assert_eq!(buffer.first_prompt_index(), 7);
    }

    proptest! {
        #[test]
        fn caps_hold_after_any_apply_sequence(
            script in prop::collection::vec((1u64..40, prop::bool::ANY), 0..400)
        ) {
            let mut buffer = ScrollBuffer::new(8, 20);
            let mut ops = Vec::new();
            let mut next_index = 0u64;
            for (step, is_prompt) in script {
                // Indices grow monotonically, with occasional repeats.
                if is_prompt {
                    next_index += u64::from(step % 2 == 0 || next_index == 0);
                    buffer.apply(prompt_entry(next_index, "cmd"), String::new(), &mut ops);
                } else if next_index > 0 {
                    buffer.apply(output_entry(next_index, "out"), String::new(), &mut ops);
                }
                prop_assert!(buffer.prompt_count() <= 8);
                prop_assert!(buffer.line_count() <= 20);
            }
        }
    }
}
