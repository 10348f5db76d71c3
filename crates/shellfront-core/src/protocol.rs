//! Wire codec for the shell-session WebSocket protocol.
//!
//! A frame is a JSON array of `[action, ...args]` tuples; one WebSocket
//! message may batch many logical events. Inbound tuples are decoded once at
//! this boundary into the closed [`ServerMsg`] enum so the rest of the engine
//! dispatches on types, not strings. Actions the engine does not own
//! (menus, notebook, auth, ...) decode to [`ServerMsg::Other`] and are handed
//! to the host unmodified.
//!
//! Decoding is strict for core actions: a malformed `row_update` is a
//! [`ProtocolError`], which callers treat as fatal for the whole batch (see
//! [`Dispatcher`](crate::dispatch::Dispatcher)).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not syntactically valid JSON.
    Json(String),
    /// The top-level JSON value is not an array of tuples.
    FrameNotAnArray,
    /// A batch element is not an array.
    TupleNotAnArray { index: usize },
    /// A tuple is empty or its first element is not an action string.
    MissingAction { index: usize },
    /// The arguments of a known action did not match its expected shape.
    BadArgs { action: String, detail: String },
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Json(detail) => write!(f, "invalid JSON frame: {detail}"),
            Self::FrameNotAnArray => write!(f, "frame is not a JSON array"),
            Self::TupleNotAnArray { index } => {
                write!(f, "batch element {index} is not an array")
            }
            Self::MissingAction { index } => {
                write!(f, "batch element {index} has no action string")
            }
            Self::BadArgs { action, detail } => {
                write!(f, "bad arguments for \"{action}\": {detail}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// Row/scroll payload types
// ---------------------------------------------------------------------------

/// One styled run of text within a screen row.
///
/// Wire shape: `[style_list, text]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(Vec<String>, String)")]
pub struct RowSpan {
    /// Style class names, in application order. Empty means default style.
    pub styles: SmallVec<[String; 2]>,
    pub text: String,
}

impl From<(Vec<String>, String)> for RowSpan {
    fn from((styles, text): (Vec<String>, String)) -> Self {
        Self {
            styles: styles.into(),
            text,
        }
    }
}

impl RowSpan {
    /// Unstyled span, mostly for tests.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            styles: SmallVec::new(),
            text: text.into(),
        }
    }
}

/// Full replacement content for one screen row.
///
/// Wire shape: `[row_index, prompt_offset, span_list]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(usize, usize, Vec<RowSpan>)")]
pub struct RowData {
    pub index: usize,
    /// Character offset where the shell prompt ends and typed text begins.
    /// Zero means the row is plain output, not a command line.
    pub prompt_offset: usize,
    pub spans: Vec<RowSpan>,
}

impl From<(usize, usize, Vec<RowSpan>)> for RowData {
    fn from((index, prompt_offset, spans): (usize, usize, Vec<RowSpan>)) -> Self {
        Self {
            index,
            prompt_offset,
            spans,
        }
    }
}

/// Presentation kind of a scrollback entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Plain text, escaped client-side.
    Text,
    /// Server-rendered rich HTML block.
    Pagelet,
    /// Server-rendered markdown block.
    Markdown,
}

/// One entry scrolled out of the live screen into the session log.
///
/// Wire shape: `[prompt_index, prompt_offset, row_kind, line_text, markup]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(u64, usize, RowKind, String, Option<String>)")]
pub struct ScrollData {
    /// Monotonically increasing command counter. A repeated value replaces
    /// the previous entries for that command (incremental output).
    pub prompt_index: u64,
    pub prompt_offset: usize,
    pub kind: RowKind,
    pub line_text: String,
    /// Pre-rendered markup; `None` means render `line_text` client-side.
    pub markup: Option<String>,
}

impl From<(u64, usize, RowKind, String, Option<String>)> for ScrollData {
    fn from(
        (prompt_index, prompt_offset, kind, line_text, markup): (
            u64,
            usize,
            RowKind,
            String,
            Option<String>,
        ),
    ) -> Self {
        Self {
            prompt_index,
            prompt_offset,
            kind,
            line_text,
            markup,
        }
    }
}

impl ScrollData {
    /// Whether this entry carries a command line (vs. plain output).
    #[must_use]
    pub fn has_prompt(&self) -> bool {
        self.prompt_offset > 0
    }
}

/// Options object leading a `row_update` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct RowUpdateOpts {
    /// Alternate-screen (full-screen application) mode is active.
    #[serde(default)]
    pub alt_mode: bool,
    /// Discard all current rows before applying.
    #[serde(default)]
    pub reset: bool,
    /// Row count the canonical screen must have after this update.
    #[serde(default)]
    pub active_rows: usize,
    /// Characters of each line that precede the prompt proper.
    #[serde(default)]
    pub pre_offset: usize,
    /// Notebook-cell prompt marker; carried for wire completeness, the
    /// notebook UI owns its interpretation.
    #[serde(default)]
    pub note_prompt: bool,
}

/// A full `row_update` message.
///
/// `cursor_x`/`cursor_y` stay signed: the server may send out-of-range or
/// negative coordinates and the screen model degrades to "no cursor" rather
/// than rejecting the batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    from = "(RowUpdateOpts, usize, usize, i64, i64, Vec<RowData>, Vec<ScrollData>)"
)]
pub struct RowUpdate {
    pub opts: RowUpdateOpts,
    pub term_width: usize,
    pub term_height: usize,
    pub cursor_x: i64,
    pub cursor_y: i64,
    pub rows: Vec<RowData>,
    pub scroll: Vec<ScrollData>,
}

#[allow(clippy::type_complexity)]
impl From<(RowUpdateOpts, usize, usize, i64, i64, Vec<RowData>, Vec<ScrollData>)> for RowUpdate {
    fn from(
        (opts, term_width, term_height, cursor_x, cursor_y, rows, scroll): (
            RowUpdateOpts,
            usize,
            usize,
            i64,
            i64,
            Vec<RowData>,
            Vec<ScrollData>,
        ),
    ) -> Self {
        Self {
            opts,
            term_width,
            term_height,
            cursor_x,
            cursor_y,
            rows,
            scroll,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// A decoded inbound tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMsg {
    /// Screen diff: row replacements plus entries scrolled into the log.
    RowUpdate(RowUpdate),
    /// Prompt markup and current-directory URI update.
    Prompt { text: String, dir_uri: String },
    /// Server-driven replacement of the current command line.
    Input { command_line: String },
    /// Completion result: zero or one matches for the pending input.
    CompletedInput { matches: Vec<String> },
    /// Any action the engine does not own; routed to the host verbatim.
    Other { action: String, args: Vec<Value> },
}

/// Parse a raw frame into its undecoded tuples.
///
/// Kept separate from [`decode_tuple`] so a dispatcher can apply early tuples
/// of a batch before a later one turns out malformed, matching the
/// fail-where-you-are batch semantics.
pub fn parse_frame(raw: &str) -> Result<Vec<Value>, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| ProtocolError::Json(err.to_string()))?;
    match value {
        Value::Array(tuples) => Ok(tuples),
        _ => Err(ProtocolError::FrameNotAnArray),
    }
}

/// Decode one `[action, ...args]` tuple.
pub fn decode_tuple(tuple: &Value, index: usize) -> Result<ServerMsg, ProtocolError> {
    let Value::Array(parts) = tuple else {
        return Err(ProtocolError::TupleNotAnArray { index });
    };
    let Some(action) = parts.first().and_then(Value::as_str) else {
        return Err(ProtocolError::MissingAction { index });
    };
    let args = parts[1..].to_vec();

    match action {
        "row_update" => Ok(ServerMsg::RowUpdate(tuple_args(action, args)?)),
        "prompt" => {
            let (text, dir_uri): (String, String) = tuple_args(action, args)?;
            Ok(ServerMsg::Prompt { text, dir_uri })
        }
        "input" => {
            let (command_line,): (String,) = tuple_args(action, args)?;
            Ok(ServerMsg::Input { command_line })
        }
        "completed_input" => {
            let (matches,): (Vec<String>,) = tuple_args(action, args)?;
            Ok(ServerMsg::CompletedInput { matches })
        }
        _ => Ok(ServerMsg::Other {
            action: action.to_string(),
            args,
        }),
    }
}

/// Decode every tuple of a frame eagerly. Test/tooling convenience; the
/// dispatcher uses the incremental pair above.
pub fn decode_frame(raw: &str) -> Result<Vec<ServerMsg>, ProtocolError> {
    let tuples = parse_frame(raw)?;
    tuples
        .iter()
        .enumerate()
        .map(|(index, tuple)| decode_tuple(tuple, index))
        .collect()
}

fn tuple_args<T: DeserializeOwned>(action: &str, args: Vec<Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Array(args)).map_err(|err| ProtocolError::BadArgs {
        action: action.to_string(),
        detail: err.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// A client-originated tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMsg {
    /// Raw terminal bytes from the key encoder.
    KeyPress(String),
    /// A whole command pasted/click-inserted onto the command line.
    PasteCommand(String),
    /// A complete input line (line-mode hosts).
    Input(String),
    /// A partial input line submitted for completion.
    IncompleteInput(String),
    /// Client-side failure report; the transport closes after sending one.
    ErrMsg(String),
}

impl ClientMsg {
    fn to_value(&self) -> Value {
        match self {
            Self::KeyPress(bytes) => serde_json::json!(["keypress", bytes]),
            Self::PasteCommand(bytes) => serde_json::json!(["paste_command", bytes]),
            Self::Input(text) => serde_json::json!(["input", text, null]),
            Self::IncompleteInput(text) => serde_json::json!(["incomplete_input", text]),
            Self::ErrMsg(text) => serde_json::json!(["errmsg", text]),
        }
    }
}

/// Serialize an outbound batch as one frame.
#[must_use]
pub fn encode_frame(msgs: &[ClientMsg]) -> String {
    let tuples: Vec<Value> = msgs.iter().map(ClientMsg::to_value).collect();
    Value::Array(tuples).to_string()
}
