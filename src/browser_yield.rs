use std::future::Future;

use sonogram_core::YieldPoint;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

/// Hands control back to the browser with a zero-duration `setTimeout`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserYield;

impl YieldPoint for BrowserYield {
    fn yield_now(&mut self) -> impl Future<Output = ()> {
        async {
            let promise = js_sys::Promise::new(&mut |resolve, _reject| {
                let Some(win) = web_sys::window() else {
                    // No event loop to yield to (worker without window): resolve at once.
                    let _ = resolve.call0(&JsValue::NULL);
                    return;
                };
                let cb = Closure::once_into_js(move || {
                    let _ = resolve.call0(&JsValue::NULL);
                });
                let _ = win.set_timeout_with_callback_and_timeout_and_arguments_0(cb.unchecked_ref(), 0);
            });
            let _ = JsFuture::from(promise).await;
        }
    }
}
