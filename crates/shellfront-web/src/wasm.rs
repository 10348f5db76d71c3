#![forbid(unsafe_code)]

//! `wasm-bindgen` export: the browser-facing terminal object.
//!
//! [`ShellfrontTerm`] owns the core dispatcher and is the only place that
//! touches the DOM. The page supplies three containers —
//! `#shellfront-screen`, `#shellfront-altscreen`, `#shellfront-scroll` —
//! plus `#shellfront-completion` / `#shellfront-typeahead` slots inside the
//! command line; everything below them is managed here by applying the
//! core's display operations in order.
//!
//! Outbound frames and collaborator actions accumulate in bounded queues the
//! host drains after each call (send frames to the socket, route actions to
//! the page furniture).

use js_sys::Array;
use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element};

use crate::input::DomKeyEvent;
use shellfront_core::dispatch::{CollaboratorSink, Dispatcher};
use shellfront_core::ops::{DisplayOp, RowNamespace};
use shellfront_core::session::SessionConfig;

/// Bounded queue limit for host-drained collaborator/resize events.
const MAX_EVENT_QUEUE: usize = 2048;

const SCREEN_ID: &str = "shellfront-screen";
const ALTSCREEN_ID: &str = "shellfront-altscreen";
const SCROLL_ID: &str = "shellfront-scroll";
const COMPLETION_ID: &str = "shellfront-completion";
const TYPEAHEAD_ID: &str = "shellfront-typeahead";

fn container_id(namespace: RowNamespace) -> &'static str {
    match namespace {
        RowNamespace::Active => SCREEN_ID,
        RowNamespace::Alternate => ALTSCREEN_ID,
    }
}

fn row_id(namespace: RowNamespace, index: usize) -> String {
    match namespace {
        RowNamespace::Active => format!("shellfront-pre{index}"),
        RowNamespace::Alternate => format!("shellfront-alt{index}"),
    }
}

/// Collects collaborator actions into the host-drained event queue.
struct EventQueue<'a>(&'a mut Vec<String>);

impl EventQueue<'_> {
    fn push(&mut self, event: serde_json::Value) {
        if self.0.len() >= MAX_EVENT_QUEUE {
            self.0.remove(0);
        }
        self.0.push(event.to_string());
    }
}

impl CollaboratorSink for EventQueue<'_> {
    fn dispatch(&mut self, action: &str, args: &[serde_json::Value]) {
        self.push(serde_json::json!({
            "kind": "action",
            "action": action,
            "args": args,
        }));
    }
}

/// The terminal object handed to the page.
#[wasm_bindgen]
pub struct ShellfrontTerm {
    dispatcher: Dispatcher,
    events: Vec<String>,
}

#[wasm_bindgen]
impl ShellfrontTerm {
    /// Create a terminal with default buffering; `type_ahead` enables local
    /// echo on the command line.
    #[wasm_bindgen(constructor)]
    pub fn new(type_ahead: bool) -> ShellfrontTerm {
        let config = SessionConfig {
            type_ahead,
            ..SessionConfig::default()
        };
        ShellfrontTerm {
            dispatcher: Dispatcher::new(config),
            events: Vec::new(),
        }
    }

    /// Apply one inbound WebSocket frame. Returns false once the transport
    /// is closed (the host should drain outbound, send, and tear down).
    pub fn on_socket_message(&mut self, raw: &str) -> bool {
        let mut queue = EventQueue(&mut self.events);
        let ops = self.dispatcher.on_message(raw, &mut queue);
        self.apply_ops(&ops);
        !self.dispatcher.is_closed()
    }

    /// Keydown path (non-printable/control keys). Returns true when the
    /// event was consumed and the host should prevent default handling.
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn key_down(
        &mut self,
        key_code: u32,
        which: u32,
        shift: bool,
        ctrl: bool,
        alt: bool,
        meta: bool,
    ) -> bool {
        self.key_common(DomKeyEvent {
            key_code,
            which,
            char_code: 0,
            shift_key: shift,
            ctrl_key: ctrl,
            alt_key: alt,
            meta_key: meta,
        })
    }

    /// Keypress path (printable characters).
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn key_press(
        &mut self,
        key_code: u32,
        which: u32,
        char_code: u32,
        shift: bool,
        ctrl: bool,
        alt: bool,
        meta: bool,
    ) -> bool {
        self.key_common(DomKeyEvent {
            key_code,
            which,
            char_code,
            shift_key: shift,
            ctrl_key: ctrl,
            alt_key: alt,
            meta_key: meta,
        })
    }

    /// Paste interactive text through the keypress path.
    pub fn paste_text(&mut self, text: &str) {
        let result = self.dispatcher.paste_text(text);
        self.apply_ops(&result.ops);
    }

    /// Paste a whole command line.
    pub fn paste_command(&mut self, command: &str) {
        let result = self.dispatcher.paste_command(command);
        self.apply_ops(&result.ops);
    }

    /// Arm or clear sticky control mode (touch keyboards).
    pub fn set_control_active(&mut self, active: bool) {
        self.dispatcher.session_mut().set_control_active(active);
    }

    /// Tell the engine a split view was engaged or released.
    pub fn set_split_screen(&mut self, engaged: bool) {
        self.dispatcher.session_mut().set_split_screen(engaged);
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Typed text of the current command line.
    pub fn command_line(&self) -> String {
        self.dispatcher.session().command_line().to_string()
    }

    /// Frames to write to the socket, oldest first.
    pub fn drain_outbound(&mut self) -> Array {
        let out = Array::new();
        for frame in self.dispatcher.drain_outbound() {
            out.push(&JsValue::from_str(&frame));
        }
        out
    }

    /// Collaborator actions and host callbacks (resize, merge), as JSON.
    pub fn drain_events(&mut self) -> Array {
        let out = Array::new();
        for event in self.events.drain(..) {
            out.push(&JsValue::from_str(&event));
        }
        out
    }
}

impl ShellfrontTerm {
    fn key_common(&mut self, event: DomKeyEvent) -> bool {
        let (key, mods) = event.normalize();
        let result = self.dispatcher.key_event(key, mods);
        self.apply_ops(&result.ops);
        result.handled
    }

    fn apply_ops(&mut self, ops: &[DisplayOp]) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            warn!("no document; display ops dropped");
            return;
        };
        for op in ops {
            self.apply_op(&document, op);
        }
    }

    fn apply_op(&mut self, document: &Document, op: &DisplayOp) {
        match op {
            DisplayOp::ShowScreen(namespace) => {
                let (show, hide) = match namespace {
                    RowNamespace::Active => (SCREEN_ID, ALTSCREEN_ID),
                    RowNamespace::Alternate => (ALTSCREEN_ID, SCREEN_ID),
                };
                if let Some(el) = element(document, show) {
                    let _ = el.class_list().remove_1("hidden");
                }
                if let Some(el) = element(document, hide) {
                    let _ = el.class_list().add_1("hidden");
                }
            }
            DisplayOp::MergeScreen { reason } => {
                self.push_event(serde_json::json!({
                    "kind": "merge_screen",
                    "reason": reason,
                }));
            }
            DisplayOp::TermSizeChanged { width, height } => {
                self.push_event(serde_json::json!({
                    "kind": "resize",
                    "width": width,
                    "height": height,
                }));
            }
            DisplayOp::ClearRows(namespace) => {
                if let Some(el) = element(document, container_id(*namespace)) {
                    el.set_inner_html("");
                }
            }
            DisplayOp::AppendBlankRow(namespace, index) => {
                let Some(container) = element(document, container_id(*namespace)) else {
                    return;
                };
                if let Ok(row) = document.create_element("span") {
                    let _ = row.set_attribute("id", &row_id(*namespace, *index));
                    let _ = row.set_attribute("class", "row");
                    row.set_inner_html("\n");
                    let _ = container.append_child(&row);
                }
            }
            DisplayOp::RemoveRow(namespace, index) => {
                if let Some(el) = element(document, &row_id(*namespace, *index)) {
                    el.remove();
                }
            }
            DisplayOp::SetRow {
                namespace,
                index,
                markup,
                is_prompt,
            } => {
                let id = row_id(*namespace, *index);
                let Some(el) = element(document, &id) else {
                    // Stale update for a row the page no longer has; the
                    // rest of the batch still applies.
                    warn!(id = id.as_str(), "missing row element");
                    return;
                };
                let class = if *is_prompt { "row cmd-line" } else { "row" };
                let _ = el.set_attribute("class", class);
                el.set_inner_html(&format!("{markup}\n"));
            }
            DisplayOp::SetCompletion(text) => {
                if let Some(el) = element(document, COMPLETION_ID) {
                    el.set_text_content(Some(text));
                }
            }
            DisplayOp::SetTypeAhead(text) => {
                if let Some(el) = element(document, TYPEAHEAD_ID) {
                    el.set_text_content(Some(text));
                }
            }
            DisplayOp::RemoveScrollGroup { prompt_index } => {
                let selector =
                    format!("#{SCROLL_ID} [data-prompt-index=\"{prompt_index}\"]");
                if let Ok(nodes) = document.query_selector_all(&selector) {
                    for i in 0..nodes.length() {
                        if let Some(el) = nodes.item(i).and_then(|n| n.dyn_into::<Element>().ok())
                        {
                            el.remove();
                        }
                    }
                }
            }
            DisplayOp::RemoveScrollRange { start, count } => {
                let Some(container) = element(document, SCROLL_ID) else {
                    return;
                };
                let children = container.children();
                // Children shift left as they are removed, so the index
                // stays put.
                for _ in 0..*count {
                    match children.item(*start as u32) {
                        Some(el) => el.remove(),
                        None => break,
                    }
                }
            }
            DisplayOp::InsertScrollMarker { index } => {
                let Some(container) = element(document, SCROLL_ID) else {
                    return;
                };
                if let Ok(marker) = document.create_element("pre") {
                    let _ = marker.set_attribute("class", "row truncated");
                    marker.set_text_content(Some("..."));
                    let anchor = container.children().item(*index as u32);
                    let _ = container.insert_before(&marker, anchor.as_deref());
                }
            }
            DisplayOp::AppendScroll {
                prompt_index,
                markup,
                is_prompt,
                ..
            } => {
                let Some(container) = element(document, SCROLL_ID) else {
                    return;
                };
                if let Ok(row) = document.create_element("pre") {
                    let class = if *is_prompt { "row promptrow" } else { "row" };
                    let _ = row.set_attribute("class", class);
                    let _ = row.set_attribute("data-prompt-index", &prompt_index.to_string());
                    row.set_inner_html(&format!("{markup}\n"));
                    let _ = container.append_child(&row);
                }
            }
        }
    }

    fn push_event(&mut self, event: serde_json::Value) {
        if self.events.len() >= MAX_EVENT_QUEUE {
            self.events.remove(0);
        }
        self.events.push(event.to_string());
    }
}

fn element(document: &Document, id: &str) -> Option<Element> {
    document.get_element_by_id(id)
}
