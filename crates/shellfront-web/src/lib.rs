#![forbid(unsafe_code)]

//! WASM frontend for `shellfront`.
//!
//! Two thin layers around [`shellfront_core`]:
//! - [`input`] — deterministic normalization of DOM keyboard events into the
//!   core's numeric key model, plus a JSON encoding for record/replay;
//! - `wasm` (wasm32 only) — the `wasm-bindgen` export: owns a core
//!   [`Dispatcher`](shellfront_core::Dispatcher), feeds events in, applies
//!   emitted display operations to the page, and exposes drain queues for
//!   outbound frames and collaborator actions.
//!
//! Everything stateful lives in the core; this crate is wiring.

pub mod input;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
