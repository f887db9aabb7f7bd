//! JS bindings for `PiiOverlay`
//!
//! ```javascript,ignore
//! import init, { PiiOverlayHandle } from 'piicore';
//!
//! await init();
//! const overlay = PiiOverlayHandle.withPersistence(
//!   { debounce_ms: 500 },
//!   (key) => localStorage.getItem(`pii:${key}`),
//!   (key, json) => localStorage.setItem(`pii:${key}`, json),
//! );
//!
//! overlay.setDocument(editor.state.doc.toJSON());
//! if (overlay.detectionDue()) {
//!   await overlay.detect((request) => api.detectPii(request));
//! }
//! view.setDecorations(overlay.annotations());
//! ```

use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

use crate::annotation::AnnotationStats;
use crate::config::OverlayConfig;
use crate::detection::{DetectionResponse, SnapshotTag, TrackerStats};
use crate::document::{Document, FlatRange};
use crate::overlay::PiiOverlay;
use crate::session::{ConversationPiiState, ModifierAction, ModifierRequest, PersistStats, ScopeKey, ScopePersistence};

// =============================================================================
// Helpers
// =============================================================================

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization failed: {}", e)))
}

fn js_error_text(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

/// Generations cross the JS boundary as `u32`
fn js_generation(tag: &SnapshotTag) -> Result<u32, String> {
    u32::try_from(tag.generation)
        .map_err(|_| format!("Detection generation {} exceeds the JS handle range", tag.generation))
}

// =============================================================================
// JS persistence adapter
// =============================================================================

/// Persistence through two host callbacks:
/// `load(key) -> string | null` and `save(key, json)`; either may throw
pub struct JsScopePersistence {
    load: js_sys::Function,
    save: js_sys::Function,
}

impl JsScopePersistence {
    pub fn new(load: js_sys::Function, save: js_sys::Function) -> Self {
        Self { load, save }
    }
}

impl ScopePersistence for JsScopePersistence {
    fn load_scope_state(&self, key: &str) -> Result<Option<ConversationPiiState>, String> {
        let value = self
            .load
            .call1(&JsValue::NULL, &JsValue::from_str(key))
            .map_err(|e| format!("load('{}') threw: {}", key, js_error_text(&e)))?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        match value.as_string() {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| format!("Corrupt scope state for '{}': {}", key, e)),
            None => serde_wasm_bindgen::from_value(value)
                .map(Some)
                .map_err(|e| format!("Corrupt scope state for '{}': {}", key, e)),
        }
    }

    fn save_scope_state(&mut self, key: &str, state: &ConversationPiiState) -> Result<(), String> {
        let json = serde_json::to_string(state).map_err(|e| format!("Failed to serialize scope '{}': {}", key, e))?;
        self.save
            .call2(&JsValue::NULL, &JsValue::from_str(key), &JsValue::from_str(&json))
            .map(|_| ())
            .map_err(|e| format!("save('{}') threw: {}", key, js_error_text(&e)))
    }
}

// =============================================================================
// PiiOverlayHandle
// =============================================================================

#[derive(Serialize)]
struct OverlayStats<'a> {
    annotations: &'a AnnotationStats,
    detection: &'a TrackerStats,
    persistence: &'a PersistStats,
}

#[derive(Serialize)]
struct JsPendingDetection<'a> {
    generation: u32,
    request: &'a crate::detection::DetectionRequest,
}

/// JS handle to one overlay session
#[wasm_bindgen]
pub struct PiiOverlayHandle {
    inner: Rc<RefCell<PiiOverlay>>,
    /// Outstanding detection calls by generation
    pending: Rc<RefCell<HashMap<u32, SnapshotTag>>>,
}

impl PiiOverlayHandle {
    fn from_overlay(overlay: PiiOverlay) -> Self {
        Self {
            inner: Rc::new(RefCell::new(overlay)),
            pending: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

fn parse_config(config: JsValue) -> Result<OverlayConfig, JsValue> {
    if config.is_null() || config.is_undefined() {
        return Ok(OverlayConfig::default());
    }
    serde_wasm_bindgen::from_value(config)
        .map_err(|e| JsValue::from_str(&format!("Invalid overlay config: {}", e)))
}

#[wasm_bindgen]
impl PiiOverlayHandle {
    /// In-memory overlay
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<PiiOverlayHandle, JsValue> {
        let config = parse_config(config)?;
        Ok(Self::from_overlay(PiiOverlay::new(config, Box::new(crate::session::MemoryPersistence::new()))))
    }

    /// Overlay whose durable scopes are loaded and saved through host callbacks
    #[wasm_bindgen(js_name = withPersistence)]
    pub fn with_persistence(config: JsValue, load: js_sys::Function, save: js_sys::Function) -> Result<PiiOverlayHandle, JsValue> {
        let config = parse_config(config)?;
        let persistence = JsScopePersistence::new(load, save);
        Ok(Self::from_overlay(PiiOverlay::new(config, Box::new(persistence))))
    }

    // -------------------------------------------------------------------------
    // Document
    // -------------------------------------------------------------------------

    /// Host editor JSON (`doc.toJSON()`)
    #[wasm_bindgen(js_name = setDocument)]
    pub fn set_document(&self, doc: JsValue) -> Result<JsValue, JsValue> {
        let document: Document = serde_wasm_bindgen::from_value(doc)
            .map_err(|e| JsValue::from_str(&format!("Failed to parse document: {}", e)))?;
        let change = self.inner.borrow_mut().set_document(document);
        to_js(&change)
    }

    #[wasm_bindgen(js_name = setDocumentJson)]
    pub fn set_document_json(&self, json: &str) -> Result<JsValue, JsValue> {
        let change = self
            .inner
            .borrow_mut()
            .set_document_json(json)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&change)
    }

    /// One paragraph per line
    #[wasm_bindgen(js_name = setPlainText)]
    pub fn set_plain_text(&self, text: &str) -> Result<JsValue, JsValue> {
        let change = self.inner.borrow_mut().set_document(Document::from_plain_text(text));
        to_js(&change)
    }

    #[wasm_bindgen(js_name = flatText)]
    pub fn flat_text(&self) -> String {
        self.inner.borrow().flat_text().to_string()
    }

    // -------------------------------------------------------------------------
    // Annotations and selections
    // -------------------------------------------------------------------------

    pub fn annotations(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.borrow().annotations())
    }

    #[wasm_bindgen(js_name = analyzeSelection)]
    pub fn analyze_selection(&self, from: usize, to: usize) -> Result<JsValue, JsValue> {
        let analysis = self
            .inner
            .borrow()
            .analyze_selection(from, to)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&analysis)
    }

    /// `start..end` is a candidate range from `analyzeSelection`
    #[wasm_bindgen(js_name = createModifierFromSelection)]
    pub fn create_modifier_from_selection(
        &self,
        start: usize,
        end: usize,
        action: &str,
        modifier_type: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let action: ModifierAction = action.parse().map_err(|e: String| JsValue::from_str(&e))?;
        let modifier = self
            .inner
            .borrow_mut()
            .create_modifier_from_selection(FlatRange::new(start, end), action, modifier_type)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&modifier)
    }

    // -------------------------------------------------------------------------
    // Store operations on the active scope
    // -------------------------------------------------------------------------

    /// `{ action, entity, type? }`; resolves to the stored modifier or null
    #[wasm_bindgen(js_name = addModifier)]
    pub fn add_modifier(&self, request: JsValue) -> Result<JsValue, JsValue> {
        let request: ModifierRequest = serde_wasm_bindgen::from_value(request)
            .map_err(|e| JsValue::from_str(&format!("Invalid modifier: {}", e)))?;
        match self.inner.borrow_mut().add_modifier(request) {
            Some(modifier) => to_js(&modifier),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = removeModifier)]
    pub fn remove_modifier(&self, id: &str) -> bool {
        self.inner.borrow_mut().remove_modifier(id)
    }

    #[wasm_bindgen(js_name = toggleMasking)]
    pub fn toggle_masking(&self, label: &str, occurrence_index: Option<usize>) -> bool {
        self.inner.borrow_mut().toggle_masking(label, occurrence_index)
    }

    #[wasm_bindgen(js_name = getEntitiesForDisplay)]
    pub fn get_entities_for_display(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.borrow_mut().entities_for_display())
    }

    #[wasm_bindgen(js_name = getActiveModifiers)]
    pub fn get_active_modifiers(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.borrow_mut().active_modifiers())
    }

    // -------------------------------------------------------------------------
    // Scopes
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = activateTemporaryScope)]
    pub fn activate_temporary_scope(&self) {
        self.inner.borrow_mut().activate_temporary_scope();
    }

    /// `null` or empty selects the temporary scope
    #[wasm_bindgen(js_name = switchScope)]
    pub fn switch_scope(&self, key: Option<String>) {
        self.inner.borrow_mut().switch_scope(ScopeKey::from(key));
    }

    #[wasm_bindgen(js_name = transferTemporaryToScope)]
    pub fn transfer_temporary_to_scope(&self, key: &str) -> Result<JsValue, JsValue> {
        let summary = self.inner.borrow_mut().transfer_to_scope(key);
        to_js(&summary)
    }

    #[wasm_bindgen(js_name = setSessionId)]
    pub fn set_session_id(&self, key: &str, session_id: Option<String>) {
        self.inner.borrow_mut().set_session_id(key, session_id);
    }

    #[wasm_bindgen(js_name = flushPending)]
    pub fn flush_pending(&self) -> usize {
        self.inner.borrow_mut().flush_pending()
    }

    // -------------------------------------------------------------------------
    // Detection
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = detectionDue)]
    pub fn detection_due(&self) -> bool {
        self.inner.borrow_mut().detection_due()
    }

    /// `{ generation, request }`; send `request` and hand the reply to `applyDetection`
    #[wasm_bindgen(js_name = beginDetection)]
    pub fn begin_detection(&self) -> Result<JsValue, JsValue> {
        let pending = self.inner.borrow_mut().begin_detection();
        let generation = match js_generation(&pending.tag) {
            Ok(generation) => generation,
            Err(message) => {
                self.inner.borrow_mut().fail_detection(pending.tag, &message);
                return Err(JsValue::from_str(&message));
            }
        };
        self.pending.borrow_mut().insert(generation, pending.tag);
        to_js(&JsPendingDetection { generation, request: &pending.request })
    }

    #[wasm_bindgen(js_name = applyDetection)]
    pub fn apply_detection(&self, generation: u32, response: JsValue) -> Result<JsValue, JsValue> {
        let tag = self
            .pending
            .borrow_mut()
            .remove(&generation)
            .ok_or_else(|| JsValue::from_str(&format!("No detection call with generation {}", generation)))?;
        let response: DetectionResponse = match serde_wasm_bindgen::from_value(response) {
            Ok(response) => response,
            Err(e) => {
                let message = format!("Invalid detection response: {}", e);
                self.inner.borrow_mut().fail_detection(tag, &message);
                return Err(JsValue::from_str(&message));
            }
        };
        let report = self.inner.borrow_mut().apply_detection(tag, response);
        to_js(&report)
    }

    #[wasm_bindgen(js_name = failDetection)]
    pub fn fail_detection(&self, generation: u32, message: &str) {
        if let Some(tag) = self.pending.borrow_mut().remove(&generation) {
            self.inner.borrow_mut().fail_detection(tag, message);
        }
    }

    /// Run one detection round: `fetcher(request)` must return a Promise of the
    /// service response. Failures resolve to `null` and leave annotations as they are.
    pub fn detect(&self, fetcher: js_sys::Function) -> js_sys::Promise {
        let inner = self.inner.clone();
        let pending = inner.borrow_mut().begin_detection();

        future_to_promise(async move {
            let request = match to_js(&pending.request) {
                Ok(request) => request,
                Err(e) => {
                    inner.borrow_mut().fail_detection(pending.tag, &js_error_text(&e));
                    return Err(e);
                }
            };
            let call = fetcher
                .call1(&JsValue::NULL, &request)
                .map(|value| js_sys::Promise::resolve(&value));

            let result = match call {
                Ok(promise) => JsFuture::from(promise).await,
                Err(e) => Err(e),
            };
            let response = match result {
                Ok(value) => value,
                Err(e) => {
                    inner.borrow_mut().fail_detection(pending.tag, &js_error_text(&e));
                    return Ok(JsValue::NULL);
                }
            };
            match serde_wasm_bindgen::from_value::<DetectionResponse>(response) {
                Ok(response) => {
                    let report = inner.borrow_mut().apply_detection(pending.tag, response);
                    to_js(&report)
                }
                Err(e) => {
                    inner
                        .borrow_mut()
                        .fail_detection(pending.tag, &format!("Invalid detection response: {}", e));
                    Ok(JsValue::NULL)
                }
            }
        })
    }

    // -------------------------------------------------------------------------
    // Masking and stats
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = maskedText)]
    pub fn masked_text(&self) -> String {
        self.inner.borrow_mut().masked_text()
    }

    pub fn unmask(&self, text: &str) -> String {
        self.inner.borrow_mut().unmask(text)
    }

    pub fn stats(&self) -> Result<JsValue, JsValue> {
        let overlay = self.inner.borrow();
        to_js(&OverlayStats {
            annotations: &overlay.annotation_set().stats,
            detection: overlay.tracker_stats(),
            persistence: overlay.persist_stats(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_fits_js_range() {
        let tag = SnapshotTag { generation: 7, content_hash: 0 };
        assert_eq!(js_generation(&tag), Ok(7));
    }

    #[test]
    fn test_generation_past_u32_is_refused() {
        let tag = SnapshotTag { generation: u64::from(u32::MAX) + 1, content_hash: 0 };
        assert!(js_generation(&tag).is_err());
    }
}
