//! Transport dispatcher: strict in-order application of inbound batches and
//! the outbound frame queue.
//!
//! One WebSocket frame carries many `[action, ...args]` tuples. They apply
//! strictly in array order; a decode failure anywhere aborts the remainder
//! of the batch, queues an `errmsg` frame describing the failure, and marks
//! the transport closed — no partial recovery, since continuing would risk
//! rendering an inconsistent screen. Localized render problems inside a
//! well-formed `row_update` (missing row, out-of-range cursor) degrade
//! inside the session instead and do not abort.
//!
//! Outbound frames accumulate in a bounded queue the host drains after each
//! call and writes to its socket.

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::keys::{KeyEvent, Modifiers};
use crate::ops::DisplayOp;
use crate::protocol::{self, ClientMsg, ProtocolError, ServerMsg};
use crate::session::{ClientSession, KeyReply, SessionConfig};

/// Upper bound on queued outbound frames; beyond it the oldest are dropped
/// (the transport is stalled anyway and will be torn down by the host).
const MAX_OUTBOUND_FRAMES: usize = 4096;

/// Receiver for the actions the engine does not own (menus, notebook,
/// auth, ...). Called in batch order, after core actions earlier in the same
/// batch have been applied.
pub trait CollaboratorSink {
    fn dispatch(&mut self, action: &str, args: &[Value]);
}

/// Discards every collaborator action.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCollaborator;

impl CollaboratorSink for NullCollaborator {
    fn dispatch(&mut self, _action: &str, _args: &[Value]) {}
}

/// Result of a keyboard event routed through the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEventResult {
    /// False: let the browser handle the event.
    pub handled: bool,
    pub ops: Vec<DisplayOp>,
}

/// Owns a [`ClientSession`] and both directions of the wire.
#[derive(Debug)]
pub struct Dispatcher {
    session: ClientSession,
    outbound: Vec<String>,
    closed: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            session: ClientSession::new(config),
            outbound: Vec::new(),
            closed: false,
        }
    }

    #[must_use]
    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ClientSession {
        &mut self.session
    }

    /// Transport has failed or been told to close; no further traffic.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Frames queued for the socket, oldest first. The host sends each and
    /// closes the transport if [`is_closed`](Self::is_closed) turned true.
    pub fn drain_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    /// Apply one inbound frame, in tuple order, returning display mutations.
    pub fn on_message(&mut self, raw: &str, collab: &mut dyn CollaboratorSink) -> Vec<DisplayOp> {
        let mut ops = Vec::new();
        if self.closed {
            return ops;
        }

        let tuples = match protocol::parse_frame(raw) {
            Ok(tuples) => tuples,
            Err(err) => {
                self.fail(&err);
                return ops;
            }
        };
        trace!(tuples = tuples.len(), "inbound batch");

        for (index, tuple) in tuples.iter().enumerate() {
            match protocol::decode_tuple(tuple, index) {
                Ok(ServerMsg::RowUpdate(update)) => {
                    ops.extend(self.session.apply_row_update(&update));
                }
                Ok(ServerMsg::Prompt { text, dir_uri }) => {
                    self.session.on_prompt(&text, &dir_uri);
                }
                Ok(ServerMsg::Input { command_line }) => {
                    ops.extend(self.session.on_input(&command_line));
                }
                Ok(ServerMsg::CompletedInput { matches }) => {
                    ops.extend(self.session.on_completed_input(&matches));
                }
                Ok(ServerMsg::Other { action, args }) => {
                    debug!(action = action.as_str(), "collaborator action");
                    collab.dispatch(&action, &args);
                }
                Err(err) => {
                    self.fail(&err);
                    break;
                }
            }
        }
        ops
    }

    /// Route one keyboard event; produced frames land on the outbound queue.
    pub fn key_event(&mut self, event: KeyEvent, modifiers: Modifiers) -> KeyEventResult {
        let reply = self.session.key_event(event, modifiers);
        self.queue_reply(reply)
    }

    /// Paste interactive text through the keypress path.
    pub fn paste_text(&mut self, text: &str) -> KeyEventResult {
        let reply = self.session.paste_text(text);
        self.queue_reply(reply)
    }

    /// Paste a whole command line.
    pub fn paste_command(&mut self, command: &str) -> KeyEventResult {
        let reply = self.session.paste_command(command);
        self.queue_reply(reply)
    }

    /// Submit a complete input line.
    pub fn send_input_line(&mut self, text: &str) -> KeyEventResult {
        let reply = self.session.send_input_line(text);
        self.queue_reply(reply)
    }

    /// Submit a partial input line for completion.
    pub fn send_incomplete_input(&mut self, text: &str) -> KeyEventResult {
        let reply = self.session.send_incomplete_input(text);
        self.queue_reply(reply)
    }

    fn queue_reply(&mut self, reply: KeyReply) -> KeyEventResult {
        for msg in reply.messages {
            self.queue_frame(protocol::encode_frame(&[msg]));
        }
        KeyEventResult {
            handled: reply.handled,
            ops: reply.ops,
        }
    }

    fn queue_frame(&mut self, frame: String) {
        if self.outbound.len() >= MAX_OUTBOUND_FRAMES {
            warn!("outbound queue full; dropping oldest frame");
            self.outbound.remove(0);
        }
        self.outbound.push(frame);
    }

    /// Abort: report the failure to the server and close the transport.
    fn fail(&mut self, err: &ProtocolError) {
        warn!(error = %err, "aborting batch; closing transport");
        self.queue_frame(protocol::encode_frame(&[ClientMsg::ErrMsg(
            err.to_string(),
        )]));
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<(String, usize)>);

    impl CollaboratorSink for Recorder {
        fn dispatch(&mut self, action: &str, args: &[Value]) {
            self.0.push((action.to_string(), args.len()));
        }
    }

    #[test]
    fn core_actions_apply_and_collaborator_actions_route() {
        let mut dispatcher = Dispatcher::default();
        let mut collab = Recorder::default();
        let raw = r#"[
            ["setup", {"host": "h"}],
            ["row_update", {"active_rows": 1}, 80, 24, 0, 0,
             [[0, 0, [[[], "hello"]]]], []],
            ["open_terminal", "tty1", null]
        ]"#;
        let ops = dispatcher.on_message(raw, &mut collab);

        assert!(
            ops.iter()
                .any(|op| matches!(op, DisplayOp::SetRow { index: 0, .. }))
        );
        assert_eq!(
            collab.0,
            vec![("setup".to_string(), 1), ("open_terminal".to_string(), 2)]
        );
        assert!(!dispatcher.is_closed());
        assert!(dispatcher.drain_outbound().is_empty());
    }

    #[test]
    fn malformed_json_reports_and_closes() {
        let mut dispatcher = Dispatcher::default();
        let ops = dispatcher.on_message("{oops", &mut NullCollaborator);

        assert!(ops.is_empty());
        assert!(dispatcher.is_closed());
        let frames = dispatcher.drain_outbound();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("[[\"errmsg\","));
    }

    #[test]
    fn bad_tuple_aborts_rest_of_batch_but_keeps_earlier_effects() {
        let mut dispatcher = Dispatcher::default();
        let mut collab = Recorder::default();
        let raw = r#"[
            ["row_update", {"active_rows": 2}, 80, 24, 0, 0, [], []],
            ["row_update", "garbage"],
            ["menu_select", "ignored"]
        ]"#;
        let ops = dispatcher.on_message(raw, &mut collab);

        // The first tuple landed before the failure.
        assert_eq!(dispatcher.session().row_count(), 2);
        assert!(!ops.is_empty());
        // The rest of the batch never ran.
        assert!(collab.0.is_empty());
        assert!(dispatcher.is_closed());
        let frames = dispatcher.drain_outbound();
        assert!(frames[0].contains("row_update"));
    }

    #[test]
    fn messages_after_close_are_ignored() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.on_message("bad", &mut NullCollaborator);
        dispatcher.drain_outbound();

        let ops = dispatcher.on_message(r#"[["prompt", "p", ""]]"#, &mut NullCollaborator);
        assert!(ops.is_empty());
        assert!(dispatcher.drain_outbound().is_empty());
    }

    #[test]
    fn key_events_queue_one_frame_per_message() {
        let mut dispatcher = Dispatcher::default();
        let result = dispatcher.key_event(KeyEvent::printable('a'), Modifiers::empty());

        assert!(result.handled);
        assert_eq!(
            dispatcher.drain_outbound(),
            vec!["[[\"keypress\",\"a\"]]".to_string()]
        );
    }

    #[test]
    fn paste_command_uses_its_own_action() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.paste_command("ls -la");
        assert_eq!(
            dispatcher.drain_outbound(),
            vec!["[[\"paste_command\",\"ls -la\"]]".to_string()]
        );
    }
}
