//! PiiCore: PII annotation overlay for rich-text editors
//!
//! A Rust/WASM implementation of the PII overlay used by the chat editor.
//! Detected entities and user modifiers live in a per-conversation session
//! store; the overlay maps their flat-text offsets onto the editor document
//! and turns them into decoration spans.
//!
//! # Architecture
//!
//! ## Document
//! - `document/extract.rs` - Flat text extraction with a per-char position map
//! - `document/mapping.rs` - PositionMapper: flat ranges -> document ranges
//! - `document/edit.rs` - TextEdit: single-splice diff of two flat texts
//!
//! ## Session
//! - `session/types.rs` - Entity, Modifier, ScopeKey, ConversationPiiState
//! - `session/store.rs` - SessionStore: per-scope entities + modifiers
//! - `session/persist.rs` - ScopePersistence + retrying PersistQueue
//!
//! ## Overlay
//! - `tokenizer/` - Selection expansion, validation, conflict checks
//! - `annotation/` - Modifier matching, overlap resolution, span building
//! - `detection/` - Request/response wire types, staleness tracking, debounce
//! - `masking/` - `[{LABEL}]` masking and unmasking
//! - `overlay.rs` - PiiOverlay: ties everything to one editor document
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { PiiOverlayHandle } from 'piicore';
//!
//! await init();
//!
//! const overlay = new PiiOverlayHandle({ debounce_ms: 500 });
//! overlay.switchScope('conversation-42');
//! overlay.setDocument(view.state.doc.toJSON());
//!
//! await overlay.detect((request) => fetch('/api/pii', {
//!   method: 'POST',
//!   body: JSON.stringify(request),
//! }).then((r) => r.json()));
//!
//! console.log(overlay.annotations());   // [{ from, to, style_class, payload }]
//! console.log(overlay.maskedText());    // "Hello [{PERSON_1}]"
//! ```

pub mod annotation;
pub mod config;
pub mod console;
pub mod detection;
pub mod document;
pub mod masking;
pub mod overlay;
pub mod session;
pub mod tokenizer;
pub mod wasm;

// Public exports
pub use annotation::*;
pub use config::*;
pub use detection::*;
pub use document::*;
pub use masking::*;
pub use overlay::*;
pub use session::*;
pub use tokenizer::*;
pub use wasm::PiiOverlayHandle;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("piicore v{}", env!("CARGO_PKG_VERSION"))
}
