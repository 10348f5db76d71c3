#![forbid(unsafe_code)]

//! Deterministic normalization of DOM keyboard events.
//!
//! The host (JS/TS) forwards the legacy numeric triple
//! (`keyCode`/`which`/`charCode`) plus modifier booleans; this module turns
//! them into the core's [`KeyEvent`] + [`Modifiers`] and provides a small,
//! stable JSON encoding suitable for record/replay of input traces.

use serde::{Deserialize, Serialize};
use shellfront_core::keys::{KeyEvent, Modifiers};

/// Raw keyboard event as captured from the DOM.
///
/// `char_code` is zero on the keydown path; keypress events carry the
/// character. This mirrors what browsers actually deliver, so traces replay
/// byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomKeyEvent {
    #[serde(default)]
    pub key_code: u32,
    #[serde(default)]
    pub which: u32,
    #[serde(default)]
    pub char_code: u32,
    #[serde(default)]
    pub shift_key: bool,
    #[serde(default)]
    pub ctrl_key: bool,
    #[serde(default)]
    pub alt_key: bool,
    #[serde(default)]
    pub meta_key: bool,
}

impl DomKeyEvent {
    /// Split into the core's event + modifier types.
    #[must_use]
    pub fn normalize(&self) -> (KeyEvent, Modifiers) {
        let event = KeyEvent {
            key_code: self.key_code,
            which: self.which,
            char_code: self.char_code,
        };
        let mut mods = Modifiers::empty();
        mods.set(Modifiers::SHIFT, self.shift_key);
        mods.set(Modifiers::CTRL, self.ctrl_key);
        mods.set(Modifiers::ALT, self.alt_key);
        mods.set(Modifiers::META, self.meta_key);
        (event, mods)
    }

    /// Encode as a stable JSON string for input traces.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a previously encoded event.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Guards against stuck modifiers: browsers drop the key-up when focus
/// leaves the tab mid-chord, so focus loss clears everything.
#[derive(Debug, Default, Clone)]
pub struct ModifierTracker {
    current: Modifiers,
}

impl ModifierTracker {
    #[must_use]
    pub const fn current(&self) -> Modifiers {
        self.current
    }

    pub fn observe(&mut self, event: &DomKeyEvent) {
        self.current = event.normalize().1;
    }

    pub fn handle_focus(&mut self, focused: bool) {
        if !focused {
            self.current = Modifiers::empty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_splits_modifiers() {
        let event = DomKeyEvent {
            key_code: 65,
            which: 65,
            char_code: 0,
            shift_key: false,
            ctrl_key: true,
            alt_key: false,
            meta_key: false,
        };
        let (key, mods) = event.normalize();
        assert_eq!(key.code(), 65);
        assert_eq!(mods, Modifiers::CTRL);
    }

    #[test]
    fn json_roundtrip_is_stable() {
        let event = DomKeyEvent {
            key_code: 13,
            which: 13,
            char_code: 13,
            shift_key: false,
            ctrl_key: false,
            alt_key: false,
            meta_key: false,
        };
        let one = event.to_json_string().expect("serialize");
        let two = event.to_json_string().expect("serialize");
        assert_eq!(one, two);
        assert_eq!(DomKeyEvent::from_json_str(&one).expect("deserialize"), event);
    }

    #[test]
    fn missing_fields_default_when_decoding() {
        let event = DomKeyEvent::from_json_str(r#"{"which": 38}"#).expect("deserialize");
        assert_eq!(event.which, 38);
        assert_eq!(event.char_code, 0);
        assert!(!event.ctrl_key);
    }

    proptest! {
        #[test]
        fn focus_loss_always_clears_modifiers(
            events in prop::collection::vec(
                (0u32..256, any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()),
                1..50,
            )
        ) {
            let mut tracker = ModifierTracker::default();
            for (code, shift, ctrl, alt, meta) in events {
                tracker.observe(&DomKeyEvent {
                    key_code: code,
                    which: code,
                    char_code: 0,
                    shift_key: shift,
                    ctrl_key: ctrl,
                    alt_key: alt,
                    meta_key: meta,
                });
            }
            tracker.handle_focus(false);
            prop_assert_eq!(tracker.current(), Modifiers::empty());
        }
    }
}
