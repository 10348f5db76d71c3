//! Key encoding: browser keyboard events to terminal byte sequences.
//!
//! [`encode`] is a total, pure function over the raw DOM key numbers: every
//! representable `(key code, modifiers)` combination yields either terminal
//! bytes, a local diversion (history recall / completion accept), or an
//! explicit [`KeyOutcome::Unhandled`] that defers to default browser
//! behavior. It never panics and never emits garbage bytes for combinations
//! it does not understand.
//!
//! The mapping is table-driven: navigation and function keys live in const
//! lookup tables, control-punctuation chords in another, with the printable
//! passthrough as the fallback.

use bitflags::bitflags;

/// ENQ; prefixes completion text so the remote line editor appends it at
/// end-of-line.
pub const ENQ: char = '\u{05}';
/// ESC; leads every multi-byte sequence.
pub const ESC: char = '\u{1b}';
/// DEL; sent for both Backspace and Delete-as-backspace, which is what the
/// server-side PTY expects on every platform.
pub const DEL: char = '\u{7f}';

bitflags! {
    /// Modifier keys held during a keyboard event.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
        const META  = 0b1000;
    }
}

/// Raw numbers from a DOM keyboard event.
///
/// `which` and `key_code` follow the legacy DOM convention: the effective
/// code is `which` when non-zero, else `key_code`. `char_code == 0` marks
/// the keydown (special-key) path; keypress events carry the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub key_code: u32,
    pub which: u32,
    pub char_code: u32,
}

impl KeyEvent {
    /// A non-printable key observed on the keydown path.
    #[must_use]
    pub const fn special(code: u32) -> Self {
        Self {
            key_code: code,
            which: code,
            char_code: 0,
        }
    }

    /// A printable character observed on the keypress path.
    #[must_use]
    pub const fn printable(ch: char) -> Self {
        Self {
            key_code: ch as u32,
            which: ch as u32,
            char_code: ch as u32,
        }
    }

    /// Effective key code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        if self.which != 0 {
            self.which
        } else {
            self.key_code
        }
    }
}

/// Session state the encoder consults; owned by the session, passed by value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyContext {
    pub modifiers: Modifiers,
    /// Alternate-screen mode: arrow keys always go to the application.
    pub alt_mode: bool,
    /// Sticky control mode (touch keyboards): next key acts as a Ctrl chord.
    pub control_active: bool,
    /// Cursor sits at the end of the editable command line.
    pub cursor_at_eol: bool,
    /// A completion tail is currently displayed.
    pub completion_pending: bool,
    /// A history-recall sequence has produced a match.
    pub recall_active: bool,
}

/// Direction of a history-recall step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallDirection {
    Older,
    Newer,
}

/// Result of encoding one keyboard event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Send these bytes to the terminal.
    Send(String),
    /// Flush the pending completion (ENQ + tail), then send these bytes.
    SendWithCompletion(String),
    /// Divert to command-history recall instead of the terminal.
    Recall(RecallDirection),
    /// Accept the pending completion (ENQ + tail), nothing else.
    Completion,
    /// Not ours; let the browser do whatever it does by default.
    Unhandled,
}

// ---------------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------------

/// Navigation keys (keydown path) to their CSI suffix.
const NAV_KEYS: &[(u32, &str)] = &[
    (33, "[5~"), // PgUp
    (34, "[6~"), // PgDn
    (35, "[4~"), // End
    (36, "[1~"), // Home
    (37, "[D"),  // Left
    (38, "[A"),  // Up
    (39, "[C"),  // Right
    (40, "[B"),  // Down
    (45, "[2~"), // Ins
    (46, "[3~"), // Del
];

/// Function keys F1..F12 to their escape suffix.
const FN_KEYS: &[(u32, &str)] = &[
    (112, "[[A"),
    (113, "[[B"),
    (114, "[[C"),
    (115, "[[D"),
    (116, "[[E"),
    (117, "[17~"),
    (118, "[18~"),
    (119, "[19~"),
    (120, "[20~"),
    (121, "[21~"),
    (122, "[23~"),
    (123, "[24~"),
];

/// Ctrl chords on punctuation keys that don't reduce arithmetically.
const CTRL_PUNCT: &[(u32, u8)] = &[
    (54, 30),  // Ctrl-^
    (109, 31), // Ctrl-_
    (219, 27), // Ctrl-[
    (220, 28), // Ctrl-\
    (221, 29), // Ctrl-]
];

fn lookup<T: Copy>(table: &[(u32, T)], code: u32) -> Option<T> {
    table
        .iter()
        .find(|(key, _)| *key == code)
        .map(|(_, value)| *value)
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encode one keyboard event against the current session context.
#[must_use]
pub fn encode(event: KeyEvent, ctx: KeyContext) -> KeyOutcome {
    let code = event.code();
    let mods = ctx.modifiers;

    // Browser shortcuts (Cmd-...) are never terminal input.
    if mods.contains(Modifiers::META) && !mods.contains(Modifiers::CTRL) {
        return KeyOutcome::Unhandled;
    }

    // Arrow keys on the canonical command line, cursor at end of line:
    // divert to history recall / completion instead of the application.
    if event.char_code == 0
        && (37..=40).contains(&code)
        && !mods.intersects(Modifiers::CTRL | Modifiers::ALT | Modifiers::META)
        && !ctx.alt_mode
        && !ctx.control_active
        && ctx.cursor_at_eol
    {
        match code {
            38 => return KeyOutcome::Recall(RecallDirection::Older),
            40 => return KeyOutcome::Recall(RecallDirection::Newer),
            39 if ctx.completion_pending => return KeyOutcome::Completion,
            _ => {}
        }
    }

    if mods.contains(Modifiers::ALT) && !mods.contains(Modifiers::CTRL) {
        return encode_alt(code);
    }

    // Sticky control mode treats `[` by key code, not character.
    if ctx.control_active && code == 91 {
        return finish(ESC.to_string(), ctx);
    }

    if mods.contains(Modifiers::CTRL) || ctx.control_active {
        return encode_ctrl(code, ctx);
    }

    if event.char_code == 0 {
        return encode_special(code, ctx);
    }

    // Printable passthrough: the keypress event already carries the
    // shifted/layouted character.
    if code == 8 {
        return finish(DEL.to_string(), ctx);
    }
    match char::from_u32(code) {
        Some(ch) => finish(ch.to_string(), ctx),
        None => KeyOutcome::Unhandled,
    }
}

fn encode_alt(code: u32) -> KeyOutcome {
    let folded = if (65..=90).contains(&code) {
        code + 32
    } else {
        code
    };
    if (97..=122).contains(&folded) {
        // Safe: 97..=122 are ASCII.
        let letter = char::from_u32(folded).unwrap_or('a');
        KeyOutcome::Send(format!("{ESC}{letter}"))
    } else {
        KeyOutcome::Unhandled
    }
}

fn encode_ctrl(code: u32, ctx: KeyContext) -> KeyOutcome {
    let byte = match code {
        0..=31 => code as u8,
        64..=90 => (code - 64) as u8,
        96..=122 => (code - 96) as u8,
        other => match lookup(CTRL_PUNCT, other) {
            Some(byte) => byte,
            None => return KeyOutcome::Unhandled,
        },
    };
    finish((byte as char).to_string(), ctx)
}

fn encode_special(code: u32, ctx: KeyContext) -> KeyOutcome {
    match code {
        9 => return finish("\t".to_string(), ctx),
        8 | 127 => return finish(DEL.to_string(), ctx),
        27 => return finish(ESC.to_string(), ctx),
        13 => return finish("\r".to_string(), ctx),
        _ => {}
    }
    let suffix = lookup(NAV_KEYS, code).or_else(|| lookup(FN_KEYS, code));
    match suffix {
        Some(suffix) => finish(format!("{ESC}{suffix}"), ctx),
        None => KeyOutcome::Unhandled,
    }
}

/// Wrap final bytes, routing Enter through the completion-accept path when a
/// recall match or completion tail is outstanding.
fn finish(bytes: String, ctx: KeyContext) -> KeyOutcome {
    let ends_with_cr = bytes.ends_with('\r');
    if ends_with_cr && (ctx.recall_active || ctx.completion_pending) {
        KeyOutcome::SendWithCompletion(bytes)
    } else {
        KeyOutcome::Send(bytes)
    }
}
