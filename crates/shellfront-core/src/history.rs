//! Prefix-matching command recall over the session's command log.
//!
//! The log is addressed by the monotone prompt-index counter, not by
//! position, so recall keeps working while the scroll buffer evicts old
//! entries. Texts are read through [`CommandSource`], which the scroll
//! buffer implements; tests substitute an in-memory map.

use crate::keys::RecallDirection;

/// Read access to logged command texts, keyed by prompt index.
pub trait CommandSource {
    /// Index of the oldest command still addressable, or 0 when empty.
    fn first_prompt_index(&self) -> u64;

    /// Command text (prompt stripped) for `prompt_index`, if still logged.
    fn command_text(&self, prompt_index: u64) -> Option<String>;
}

/// Recall state for one session.
///
/// A recall sequence starts at the first up/down arrow on the command line
/// and ends when any other input is produced. The text the user had typed is
/// saved at sequence start and handed back when the cursor walks past the
/// newest entry again.
#[derive(Debug, Default, Clone)]
pub struct CommandHistory {
    match_index: Option<u64>,
    match_prev: Option<String>,
    saved: Option<String>,
}

impl CommandHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The match produced by the current sequence, if any.
    ///
    /// Outlives the sequence itself: Enter consults it to decide whether a
    /// completion flush is due even after the saved buffer was cleared.
    #[must_use]
    pub fn active_match(&self) -> Option<&str> {
        self.match_prev.as_deref()
    }

    /// The command text saved at the start of the current sequence.
    #[must_use]
    pub fn saved_command(&self) -> Option<&str> {
        self.saved.as_deref()
    }

    /// Begin a sequence if none is active, saving `current_text` and parking
    /// the cursor one past the newest entry.
    pub fn begin_sequence(&mut self, current_text: &str, newest_index: u64) {
        if self.saved.is_none() {
            self.saved = Some(current_text.to_string());
            self.match_index = Some(newest_index);
            self.match_prev = None;
        }
    }

    /// End the sequence. Idempotent; called on any non-recall input.
    pub fn reset_sequence(&mut self) {
        self.saved = None;
        self.match_index = None;
    }

    /// Step the recall cursor and return the matched command, the saved
    /// buffer (when walking past newest), or `None` when nothing matches.
    ///
    /// Consecutive duplicate entries and entries not starting with `prefix`
    /// are skipped. Callers leave the command line untouched on `None`.
    pub fn recall(
        &mut self,
        source: &dyn CommandSource,
        prefix: &str,
        direction: RecallDirection,
        newest_index: u64,
    ) -> Option<String> {
        let mut index = self.match_index.unwrap_or(newest_index);

        match direction {
            RecallDirection::Newer => {
                while index < newest_index {
                    index += 1;
                    if index >= newest_index {
                        self.match_index = Some(index);
                        return self.saved.clone();
                    }
                    if let Some(found) = self.try_match(source, prefix, index) {
                        return Some(found);
                    }
                }
                self.match_index = Some(index);
                None
            }
            RecallDirection::Older => {
                let first = source.first_prompt_index();
                while index > first {
                    index -= 1;
                    if let Some(found) = self.try_match(source, prefix, index) {
                        return Some(found);
                    }
                }
                self.match_index = Some(index);
                None
            }
        }
    }

    /// Record and return the entry at `index` if it is a fresh prefix match.
    fn try_match(
        &mut self,
        source: &dyn CommandSource,
        prefix: &str,
        index: u64,
    ) -> Option<String> {
        let cmd = source.command_text(index)?;
        if cmd.is_empty()
            || self.match_prev.as_deref() == Some(cmd.as_str())
            || !cmd.starts_with(prefix)
        {
            return None;
        }
        self.match_prev = Some(cmd.clone());
        self.match_index = Some(index);
        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    struct MapSource(BTreeMap<u64, String>);

    impl MapSource {
        fn new(cmds: &[(u64, &str)]) -> Self {
            Self(
                cmds.iter()
                    .map(|(idx, cmd)| (*idx, (*cmd).to_string()))
                    .collect(),
            )
        }
    }

    impl CommandSource for MapSource {
        fn first_prompt_index(&self) -> u64 {
            self.0.keys().next().copied().unwrap_or(0)
        }

        fn command_text(&self, prompt_index: u64) -> Option<String> {
            self.0.get(&prompt_index).cloned()
        }
    }

    fn older(history: &mut CommandHistory, source: &MapSource, newest: u64) -> Option<String> {
        history.recall(source, "", RecallDirection::Older, newest)
    }

    fn newer(history: &mut CommandHistory, source: &MapSource, newest: u64) -> Option<String> {
        history.recall(source, "", RecallDirection::Newer, newest)
    }

    #[test]
    fn walks_older_then_stops_at_first_entry() {
        let source = MapSource::new(&[(1, "ls"), (2, "make"), (3, "cd /tmp")]);
        let mut history = CommandHistory::new();
        history.begin_sequence("", 4);

        assert_eq!(older(&mut history, &source, 4).as_deref(), Some("cd /tmp"));
        assert_eq!(older(&mut history, &source, 4).as_deref(), Some("make"));
        assert_eq!(older(&mut history, &source, 4).as_deref(), Some("ls"));
        // Past the oldest entry: no further matches, line untouched.
        assert_eq!(older(&mut history, &source, 4), None);
        assert_eq!(older(&mut history, &source, 4), None);
    }

    #[test]
    fn consecutive_duplicates_are_skipped() {
        let source = MapSource::new(&[(1, "ls"), (2, "make"), (3, "make"), (4, "make")]);
        let mut history = CommandHistory::new();
        history.begin_sequence("", 5);

        assert_eq!(older(&mut history, &source, 5).as_deref(), Some("make"));
        assert_eq!(older(&mut history, &source, 5).as_deref(), Some("ls"));
    }

    #[test]
    fn prefix_filters_matches() {
        let source = MapSource::new(&[(1, "git log"), (2, "ls"), (3, "git status")]);
        let mut history = CommandHistory::new();
        history.begin_sequence("git", 4);

        let recall = |history: &mut CommandHistory| {
            history.recall(&source, "git", RecallDirection::Older, 4)
        };
        assert_eq!(recall(&mut history).as_deref(), Some("git status"));
        assert_eq!(recall(&mut history).as_deref(), Some("git log"));
        assert_eq!(recall(&mut history), None);
    }

    #[test]
    fn down_past_newest_restores_saved_text() {
        let source = MapSource::new(&[(1, "ls"), (2, "make")]);
        let mut history = CommandHistory::new();
        history.begin_sequence("mak", 3);

        assert_eq!(
            history
                .recall(&source, "mak", RecallDirection::Older, 3)
                .as_deref(),
            Some("make")
        );
        assert_eq!(
            history
                .recall(&source, "mak", RecallDirection::Newer, 3)
                .as_deref(),
            Some("mak")
        );
    }

    #[test]
    fn fresh_sequence_clears_previous_match() {
        let source = MapSource::new(&[(1, "ls")]);
        let mut history = CommandHistory::new();
        history.begin_sequence("", 2);
        assert_eq!(older(&mut history, &source, 2).as_deref(), Some("ls"));
        assert_eq!(history.active_match(), Some("ls"));

        history.reset_sequence();
        history.begin_sequence("", 2);
        // The same entry matches again: match_prev restarts with the sequence.
        assert_eq!(older(&mut history, &source, 2).as_deref(), Some("ls"));
    }

    #[test]
    fn begin_sequence_is_a_no_op_while_active() {
        let source = MapSource::new(&[(1, "ls")]);
        let mut history = CommandHistory::new();
        history.begin_sequence("typed", 2);
        assert_eq!(older(&mut history, &source, 2).as_deref(), Some("ls"));
        // A second begin while active must not overwrite the saved text.
        history.begin_sequence("ls", 2);
        assert_eq!(history.saved_command(), Some("typed"));
    }

    proptest! {
        #[test]
        fn up_then_down_round_trips_to_saved_text(
            cmds in prop::collection::vec("[a-z]{1,8}", 1..20),
            typed in "[a-z]{0,4}",
            ups in 1usize..30,
        ) {
            let indexed: Vec<(u64, &str)> = cmds
                .iter()
                .enumerate()
                .map(|(pos, cmd)| (pos as u64 + 1, cmd.as_str()))
                .collect();
            let source = MapSource::new(&indexed);
            let newest = cmds.len() as u64 + 1;

            let mut history = CommandHistory::new();
            history.begin_sequence(&typed, newest);
            for _ in 0..ups {
                history.recall(&source, &typed, RecallDirection::Older, newest);
            }
            // Walking down far enough always lands back on the saved text.
            let mut last = None;
            for _ in 0..(ups + cmds.len() + 1) {
                if let Some(text) = history.recall(&source, &typed, RecallDirection::Newer, newest) {
                    last = Some(text);
                }
            }
            prop_assert_eq!(last.as_deref(), Some(typed.as_str()));
        }
    }
}
