//! Session engine: the single owner of all mutable client state.
//!
//! [`ClientSession`] composes the screen model (row namespaces, cursor,
//! alternate-screen flag), the scroll buffer, the key encoder context, and
//! the history/completion machinery. Inbound updates and keyboard events go
//! in; ordered [`DisplayOp`] lists and outbound [`ClientMsg`]s come out. No
//! DOM, no socket: hosts own both ends.

use tracing::{debug, warn};

use crate::history::CommandHistory;
use crate::keys::{self, ENQ, KeyContext, KeyEvent, KeyOutcome, Modifiers, RecallDirection};
use crate::ops::{DisplayOp, RowNamespace};
use crate::protocol::{ClientMsg, RowUpdate};
use crate::render;
use crate::scrollback::{MAX_COMMAND_BUFFER, MAX_LINE_BUFFER, ScrollBuffer, ScrollEntry};

// ---------------------------------------------------------------------------
// Configuration and small state types
// ---------------------------------------------------------------------------

/// Tuning knobs for [`ClientSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum prompt-bearing scrollback entries.
    pub max_command_buffer: usize,
    /// Maximum plain output scrollback entries.
    pub max_line_buffer: usize,
    /// Local type-ahead echo on the command line.
    pub type_ahead: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_command_buffer: MAX_COMMAND_BUFFER,
            max_line_buffer: MAX_LINE_BUFFER,
            type_ahead: false,
        }
    }
}

/// Cursor position, recomputed from each update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub row: usize,
    pub col: usize,
    /// Cursor sits at the end of the command line; history recall arms only
    /// in this state.
    pub at_end_of_line: bool,
}

/// Rendered state of one screen row, kept to suppress no-op row writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ScreenRow {
    markup: String,
    is_prompt: bool,
}

/// Local echo of keystrokes ahead of server acknowledgment.
///
/// Printable bytes accumulate, DEL trims; any other control byte freezes the
/// accumulator until the prompt row is next rebuilt. Freezing on the first
/// non-printable byte keeps passwords from echoing.
#[derive(Debug, Default, Clone)]
pub struct TypeAhead {
    text: String,
    frozen: bool,
}

impl TypeAhead {
    /// Feed outgoing bytes; returns whether the echo text changed.
    pub fn feed(&mut self, bytes: &str) -> bool {
        if self.frozen {
            return false;
        }
        let mut changed = false;
        for ch in bytes.chars() {
            let code = ch as u32;
            if (32..127).contains(&code) {
                self.text.push(ch);
                changed = true;
            } else if code == 0x7f && !self.text.is_empty() {
                self.text.pop();
                changed = true;
            } else {
                self.frozen = true;
                break;
            }
        }
        changed
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.frozen = false;
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Result of one keyboard event.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct KeyReply {
    /// False means the event was not terminal input; let the browser act.
    pub handled: bool,
    /// Outbound messages, one frame each, in send order.
    pub messages: Vec<ClientMsg>,
    pub ops: Vec<DisplayOp>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// All mutable state of one terminal session, in one place.
#[derive(Debug)]
pub struct ClientSession {
    config: SessionConfig,
    alt_mode: bool,
    split_screen: bool,
    term_width: usize,
    term_height: usize,
    rows: Vec<ScreenRow>,
    alt_rows: Vec<ScreenRow>,
    cursor: Option<Cursor>,
    cursor_at_eol: bool,
    prompt_text: String,
    cur_dir_uri: String,
    /// Typed text of the current command line, derived from prompt row 0.
    command_line: String,
    /// Completion tail displayed after the command line.
    completion: String,
    type_ahead: TypeAhead,
    /// Sticky control mode: the next key acts as a Ctrl chord.
    control_active: bool,
    history: CommandHistory,
    scrollback: ScrollBuffer,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl ClientSession {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let scrollback = ScrollBuffer::new(config.max_command_buffer, config.max_line_buffer);
        Self {
            config,
            alt_mode: false,
            split_screen: false,
            term_width: 0,
            term_height: 0,
            rows: Vec::new(),
            alt_rows: Vec::new(),
            cursor: None,
            cursor_at_eol: false,
            prompt_text: String::new(),
            cur_dir_uri: String::new(),
            command_line: String::new(),
            completion: String::new(),
            type_ahead: TypeAhead::default(),
            control_active: false,
            history: CommandHistory::new(),
            scrollback,
        }
    }

    // ── Read-side accessors ─────────────────────────────────────────

    #[must_use]
    pub fn alt_mode(&self) -> bool {
        self.alt_mode
    }

    #[must_use]
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    #[must_use]
    pub fn term_size(&self) -> (usize, usize) {
        (self.term_width, self.term_height)
    }

    /// Typed text of the current command line.
    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    #[must_use]
    pub fn completion(&self) -> &str {
        &self.completion
    }

    #[must_use]
    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    #[must_use]
    pub fn cur_dir_uri(&self) -> &str {
        &self.cur_dir_uri
    }

    #[must_use]
    pub fn scrollback(&self) -> &ScrollBuffer {
        &self.scrollback
    }

    #[must_use]
    pub fn control_active(&self) -> bool {
        self.control_active
    }

    /// Number of rows in the visible namespace.
    #[must_use]
    pub fn row_count(&self) -> usize {
        if self.alt_mode {
            self.alt_rows.len()
        } else {
            self.rows.len()
        }
    }

    // ── Host-driven toggles ─────────────────────────────────────────

    /// Arm or clear sticky control mode (touch keyboards).
    pub fn set_control_active(&mut self, active: bool) {
        self.control_active = active;
    }

    /// Record that the host engaged/released a split view.
    pub fn set_split_screen(&mut self, engaged: bool) {
        self.split_screen = engaged;
    }

    // ── Inbound message application ─────────────────────────────────

    /// Apply one `row_update` message, returning display mutations in order.
    pub fn apply_row_update(&mut self, update: &RowUpdate) -> Vec<DisplayOp> {
        let mut ops = Vec::new();
        let opts = update.opts;

        // Alternate-screen transitions swap the visible namespace; a split
        // view cannot survive entering a full-screen application.
        if opts.alt_mode != self.alt_mode {
            self.alt_mode = opts.alt_mode;
            if self.alt_mode {
                if self.split_screen {
                    self.merge_screen("alt_mode", &mut ops);
                }
                ops.push(DisplayOp::ShowScreen(RowNamespace::Alternate));
            } else {
                ops.push(DisplayOp::ShowScreen(RowNamespace::Active));
            }
        }

        if update.term_width != self.term_width || update.term_height != self.term_height {
            self.term_width = update.term_width;
            self.term_height = update.term_height;
            ops.push(DisplayOp::TermSizeChanged {
                width: update.term_width,
                height: update.term_height,
            });
        }

        self.reconcile_row_count(update, &mut ops);
        self.apply_rows(update, &mut ops);

        for data in &update.scroll {
            let rendered = match &data.markup {
                Some(markup) => markup.clone(),
                None => render::escape_with_prompt(
                    &data.line_text,
                    opts.pre_offset,
                    data.prompt_offset,
                ),
            };
            let entry = ScrollEntry {
                prompt_index: data.prompt_index,
                prompt_offset: data.prompt_offset,
                kind: data.kind,
                line_text: data.line_text.clone(),
                markup: data.markup.clone(),
                is_marker: false,
            };
            self.scrollback.apply(entry, rendered, &mut ops);
        }

        debug!(
            rows = update.rows.len(),
            scroll = update.scroll.len(),
            alt_mode = opts.alt_mode,
            "applied row update"
        );
        ops
    }

    /// Grow/shrink the row list to match the update; idempotent when the
    /// count already matches and no reset was requested.
    fn reconcile_row_count(&mut self, update: &RowUpdate, ops: &mut Vec<DisplayOp>) {
        let opts = update.opts;
        if !opts.alt_mode {
            if !opts.reset && self.rows.len() == opts.active_rows {
                return;
            }
            if opts.reset {
                self.rows.clear();
                ops.push(DisplayOp::ClearRows(RowNamespace::Active));
                if self.split_screen {
                    self.merge_screen("reset", ops);
                }
            }
            if self.split_screen && opts.active_rows != 1 {
                self.merge_screen("rows", ops);
            }
            let current = self.rows.len();
            if opts.active_rows < current {
                for index in opts.active_rows..current {
                    ops.push(DisplayOp::RemoveRow(RowNamespace::Active, index));
                }
                self.rows.truncate(opts.active_rows);
            } else {
                for index in current..opts.active_rows {
                    ops.push(DisplayOp::AppendBlankRow(RowNamespace::Active, index));
                    self.rows.push(ScreenRow::default());
                }
            }
        } else if opts.reset || self.alt_rows.is_empty() {
            self.cursor_at_eol = false;
            self.alt_rows = vec![ScreenRow::default(); update.term_height];
            ops.push(DisplayOp::ClearRows(RowNamespace::Alternate));
            for index in 0..update.term_height {
                ops.push(DisplayOp::AppendBlankRow(RowNamespace::Alternate, index));
            }
        }
    }

    fn apply_rows(&mut self, update: &RowUpdate, ops: &mut Vec<DisplayOp>) {
        if update.rows.is_empty() {
            return;
        }
        self.cursor = None;
        self.cursor_at_eol = false;

        let namespace = if update.opts.alt_mode {
            RowNamespace::Alternate
        } else {
            RowNamespace::Active
        };
        let cursor = cursor_coords(update.cursor_x, update.cursor_y);

        for row in &update.rows {
            let row_count = match namespace {
                RowNamespace::Active => self.rows.len(),
                RowNamespace::Alternate => self.alt_rows.len(),
            };
            if row.index >= row_count {
                // A stale or malformed update; skip this row, keep the batch.
                warn!(index = row.index, row_count, "row update for missing row");
                continue;
            }

            let cursor_here = cursor
                .filter(|(_, y)| *y == row.index)
                .map(|(x, _)| x);
            let (markup, is_prompt) = if row.prompt_offset > 0 {
                let rendered = render::render_prompt_row(
                    &row.spans,
                    update.opts.pre_offset,
                    row.prompt_offset,
                    cursor_here,
                );
                if let Some(col) = cursor_here {
                    self.cursor_at_eol = rendered.cursor_at_eol;
                    self.cursor = Some(Cursor {
                        row: row.index,
                        col,
                        at_end_of_line: rendered.cursor_at_eol,
                    });
                }
                if row.index == 0 && namespace == RowNamespace::Active {
                    self.command_line = rendered.command;
                    // Rebuilding the command line recreates the completion
                    // and type-ahead slots empty.
                    if !self.completion.is_empty() {
                        self.completion.clear();
                        ops.push(DisplayOp::SetCompletion(String::new()));
                    }
                    if !self.type_ahead.text().is_empty() || self.type_ahead.is_frozen() {
                        self.type_ahead.reset();
                        ops.push(DisplayOp::SetTypeAhead(String::new()));
                    }
                }
                (rendered.markup, true)
            } else {
                if let Some(col) = cursor_here {
                    self.cursor = Some(Cursor {
                        row: row.index,
                        col,
                        at_end_of_line: false,
                    });
                }
                (render::render_plain_row(&row.spans, cursor_here), false)
            };

            let slot = match namespace {
                RowNamespace::Active => &mut self.rows[row.index],
                RowNamespace::Alternate => &mut self.alt_rows[row.index],
            };
            let next = ScreenRow {
                markup,
                is_prompt,
            };
            if *slot != next {
                ops.push(DisplayOp::SetRow {
                    namespace,
                    index: row.index,
                    markup: next.markup.clone(),
                    is_prompt,
                });
                *slot = next;
            }
        }
    }

    /// `prompt` action: prompt markup and current-directory URI.
    pub fn on_prompt(&mut self, text: &str, dir_uri: &str) {
        self.prompt_text = text.to_string();
        self.cur_dir_uri = dir_uri.to_string();
    }

    /// `input` action: the server replaced the current command line.
    pub fn on_input(&mut self, command_line: &str) -> Vec<DisplayOp> {
        let mut ops = Vec::new();
        self.set_command_text(command_line, false, &mut ops);
        ops
    }

    /// `completed_input` action: apply a unique completion match.
    pub fn on_completed_input(&mut self, matches: &[String]) -> Vec<DisplayOp> {
        let mut ops = Vec::new();
        if let [only] = matches {
            self.set_command_text(only, false, &mut ops);
        }
        ops
    }

    // ── Keyboard input ──────────────────────────────────────────────

    /// Translate one keyboard event into outbound frames and display ops.
    pub fn key_event(&mut self, event: KeyEvent, modifiers: Modifiers) -> KeyReply {
        let ctx = KeyContext {
            modifiers,
            alt_mode: self.alt_mode,
            control_active: self.control_active,
            cursor_at_eol: self.cursor_at_eol,
            completion_pending: !self.completion.is_empty(),
            recall_active: self.history.active_match().is_some(),
        };
        let mut reply = KeyReply {
            handled: true,
            ..KeyReply::default()
        };
        match keys::encode(event, ctx) {
            KeyOutcome::Unhandled => reply.handled = false,
            KeyOutcome::Recall(direction) => self.recall(direction, &mut reply),
            KeyOutcome::Completion => self.flush_completion(&mut reply),
            KeyOutcome::SendWithCompletion(bytes) => {
                self.flush_completion(&mut reply);
                self.term_input(&bytes, true, &mut reply);
            }
            KeyOutcome::Send(bytes) => self.term_input(&bytes, true, &mut reply),
        }
        reply
    }

    /// Host-initiated paste of interactive text (goes through the keypress
    /// path, without type-ahead).
    pub fn paste_text(&mut self, text: &str) -> KeyReply {
        let mut reply = KeyReply {
            handled: true,
            ..KeyReply::default()
        };
        self.term_input(text, false, &mut reply);
        reply
    }

    /// Host-initiated paste of a whole command line.
    pub fn paste_command(&mut self, command: &str) -> KeyReply {
        let mut reply = KeyReply {
            handled: true,
            ..KeyReply::default()
        };
        self.received_user_input(&mut reply.ops);
        reply.messages.push(ClientMsg::PasteCommand(command.to_string()));
        reply
    }

    /// Submit a complete input line (line-mode hosts).
    pub fn send_input_line(&mut self, text: &str) -> KeyReply {
        let mut reply = KeyReply {
            handled: true,
            ..KeyReply::default()
        };
        self.received_user_input(&mut reply.ops);
        reply
            .messages
            .push(ClientMsg::Input(strip_nbsp(text)));
        reply
    }

    /// Submit a partial input line for completion.
    pub fn send_incomplete_input(&mut self, text: &str) -> KeyReply {
        let mut reply = KeyReply {
            handled: true,
            ..KeyReply::default()
        };
        self.received_user_input(&mut reply.ops);
        reply
            .messages
            .push(ClientMsg::IncompleteInput(strip_nbsp(text)));
        reply
    }

    // ── Internals ───────────────────────────────────────────────────

    fn recall(&mut self, direction: RecallDirection, reply: &mut KeyReply) {
        let current = self.command_line.clone();
        let newest = self.scrollback.prompt_index() + 1;
        self.history.begin_sequence(&current, newest);
        let matched = self
            .history
            .recall(&self.scrollback, &current, direction, newest);
        if let Some(text) = matched {
            self.set_command_text(&text, true, &mut reply.ops);
        }
    }

    /// Accept the pending completion: the remote line editor receives ENQ
    /// plus the tail and appends it at end-of-line.
    fn flush_completion(&mut self, reply: &mut KeyReply) {
        let tail = std::mem::take(&mut self.completion);
        if tail.is_empty() {
            return;
        }
        reply.ops.push(DisplayOp::SetCompletion(String::new()));
        self.term_input(&format!("{ENQ}{tail}"), false, reply);
    }

    /// Send raw bytes to the terminal, with the bookkeeping every produced
    /// input implies.
    fn term_input(&mut self, bytes: &str, allow_type_ahead: bool, reply: &mut KeyReply) {
        if allow_type_ahead
            && self.config.type_ahead
            && !self.alt_mode
            && self.rows.iter().any(|row| row.is_prompt)
            && self.type_ahead.feed(bytes)
        {
            reply
                .ops
                .push(DisplayOp::SetTypeAhead(self.type_ahead.text().to_string()));
        }
        self.received_user_input(&mut reply.ops);
        reply.messages.push(ClientMsg::KeyPress(bytes.to_string()));
        self.cur_dir_uri.clear();
    }

    /// Idempotent clears implied by any produced input.
    fn received_user_input(&mut self, ops: &mut Vec<DisplayOp>) {
        self.control_active = false;
        self.history.reset_sequence();
        if !self.completion.is_empty() {
            self.completion.clear();
            ops.push(DisplayOp::SetCompletion(String::new()));
        }
    }

    /// Display `text` on the command line. With the current text as a
    /// literal prefix the remainder becomes the completion tail; otherwise
    /// the line is left untouched.
    fn set_command_text(&mut self, text: &str, no_clear: bool, ops: &mut Vec<DisplayOp>) {
        if let Some(tail) = text.strip_prefix(self.command_line.as_str()) {
            self.completion = tail.to_string();
            ops.push(DisplayOp::SetCompletion(tail.to_string()));
        }
        if !no_clear {
            self.history.reset_sequence();
        }
    }

    fn merge_screen(&mut self, reason: &'static str, ops: &mut Vec<DisplayOp>) {
        self.split_screen = false;
        ops.push(DisplayOp::MergeScreen { reason });
    }
}

/// Convert wire cursor coordinates, degrading to "no cursor" when either is
/// out of the representable range.
fn cursor_coords(cursor_x: i64, cursor_y: i64) -> Option<(usize, usize)> {
    let x = usize::try_from(cursor_x).ok()?;
    let y = usize::try_from(cursor_y).ok()?;
    Some((x, y))
}

/// Normalize non-breaking spaces before text leaves the client.
fn strip_nbsp(text: &str) -> String {
    text.chars()
        .map(|ch| if ch == '\u{a0}' { ' ' } else { ch })
        .collect()
}
