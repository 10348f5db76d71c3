//! Host-agnostic engine for a browser-based remote shell client.
//!
//! The server owns the PTY and streams structured screen diffs; this crate
//! rebuilds the visible terminal from them and turns keyboard events into
//! the byte sequences the remote shell expects. There is no DOM and no
//! socket here: the engine consumes decoded wire messages and emits ordered
//! [`DisplayOp`] lists plus outbound frames, which a thin host shim applies.
//!
//! Layering, leaves first:
//! - [`keys`] — pure key-event encoding (modifiers, alternate screen,
//!   recall/completion diversion),
//! - [`history`] — prefix-matching command recall,
//! - [`render`] — span list + cursor to markup,
//! - [`scrollback`] — bounded command/output log with visible truncation,
//! - [`session`] — the single owner of all mutable session state,
//! - [`protocol`] / [`dispatch`] — wire codec and strict in-order batch
//!   application.

pub mod dispatch;
pub mod history;
pub mod keys;
pub mod ops;
pub mod protocol;
pub mod render;
pub mod scrollback;
pub mod session;

pub use dispatch::{CollaboratorSink, Dispatcher, KeyEventResult, NullCollaborator};
pub use history::{CommandHistory, CommandSource};
pub use keys::{KeyContext, KeyEvent, KeyOutcome, Modifiers, RecallDirection, encode};
pub use ops::{DisplayOp, RowNamespace};
pub use protocol::{
    ClientMsg, ProtocolError, RowData, RowKind, RowSpan, RowUpdate, RowUpdateOpts, ScrollData,
    ServerMsg, decode_frame, encode_frame,
};
pub use scrollback::{MAX_COMMAND_BUFFER, MAX_LINE_BUFFER, ScrollBuffer, ScrollEntry};
pub use session::{ClientSession, Cursor, KeyReply, SessionConfig, TypeAhead};
