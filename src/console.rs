//! Browser console logging
//!
//! Forwards to `web_sys::console` when running as WASM. Native builds (tests,
//! benches) have no console to talk to, so every call compiles to a no-op there.

/// Informational message
#[inline]
pub fn log(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::log_1(&wasm_bindgen::JsValue::from_str(message));

    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}

/// Recoverable problem (dropped range, stale response, retried save)
#[inline]
pub fn warn(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::warn_1(&wasm_bindgen::JsValue::from_str(message));

    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}

/// Failure that degraded functionality (detection call failed, save gave up)
#[inline]
pub fn error(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::error_1(&wasm_bindgen::JsValue::from_str(message));

    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}
