//! WASM bindings for the rich-text engine
//!
//! Every entry point takes and returns JSON strings; errors reach the host
//! as string `JsValue`s and never leave a document half-applied.

pub mod bindings;

pub use bindings::WasmDocument;

use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console, js_name = log)]
    pub fn console_log_str(s: &str);

    #[wasm_bindgen(js_namespace = console, js_name = warn)]
    pub fn console_warn_str(s: &str);
}

/// Install the panic hook so engine panics surface as `console.error`
///
/// Returns the engine version so hosts can log which build they loaded.
#[wasm_bindgen(js_name = initPanicHook)]
pub fn init_panic_hook() -> String {
    console_error_panic_hook::set_once();
    env!("CARGO_PKG_VERSION").to_string()
}

/// `console.log` with `format!` arguments
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => {
        $crate::wasm::console_log_str(&format!($($t)*))
    }
}

/// `console.warn` with `format!` arguments
#[macro_export]
macro_rules! console_warn {
    ($($t:tt)*) => {
        $crate::wasm::console_warn_str(&format!($($t)*))
    }
}
