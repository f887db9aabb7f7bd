//! Browser tests for the JS handle. Run with `wasm-pack test --headless --firefox`.

#![cfg(target_arch = "wasm32")]

use piicore::PiiOverlayHandle;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn test_plain_text_round_trip() {
    let overlay = PiiOverlayHandle::new(JsValue::UNDEFINED).unwrap();
    overlay.set_plain_text("Contact John Doe").unwrap();
    assert_eq!(overlay.flat_text(), "Contact John Doe");
}

#[wasm_bindgen_test]
fn test_modifier_from_selection_masks_text() {
    let overlay = PiiOverlayHandle::new(JsValue::UNDEFINED).unwrap();
    overlay.set_plain_text("Project Falcon starts").unwrap();

    overlay
        .create_modifier_from_selection(8, 14, "mask", Some("PROJECT".into()))
        .unwrap();

    assert!(overlay.get_active_modifiers().is_ok());
    assert!(overlay.create_modifier_from_selection(8, 14, "unmask", None).is_err());
}

#[wasm_bindgen_test]
fn test_unknown_generation_is_rejected() {
    let overlay = PiiOverlayHandle::new(JsValue::UNDEFINED).unwrap();
    overlay.set_plain_text("Hi").unwrap();
    assert!(overlay.apply_detection(99, JsValue::NULL).is_err());
}
