mod api;
mod app;
mod components;
mod config;
mod logging;
mod models;
mod pages;
mod runtime;
mod state;
#[cfg(test)]
mod testing;
mod util;

use crate::app::App;
use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// WASM-only tests (run with `cargo test --target wasm32-unknown-unknown` + wasm-bindgen-test-runner)
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use crate::config::{EnvConfig, DEFAULT_TIMEOUT_MS};
    use crate::logging::init_logging;
    use crate::runtime::{BrowserRuntime, Runtime};
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_env_config_falls_back_to_page_origin() {
        let origin = web_sys::window()
            .and_then(|w| w.location().origin().ok())
            .expect("page origin");
        let config = EnvConfig::load(None);
        assert_eq!(config.api_url, origin);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);

        let config = EnvConfig::load(Some("http://override.test/".to_string()));
        assert_eq!(config.api_url, "http://override.test/");
    }

    #[wasm_bindgen_test]
    fn test_console_logger_installs_once() {
        assert!(init_logging("debug").is_ok());
        assert!(init_logging("debug").is_ok());
        assert!(init_logging("error").is_err());
    }

    #[wasm_bindgen_test]
    async fn test_browser_runtime_sleep_advances_clock() {
        let runtime = BrowserRuntime;
        let before = runtime.now_ms();
        runtime.sleep(20).await;
        assert!(runtime.now_ms() >= before + 15);
    }

    #[wasm_bindgen_test]
    async fn test_browser_runtime_dropped_sleep_leaves_later_timers_alone() {
        let runtime = BrowserRuntime;
        drop(runtime.sleep(5));
        let before = runtime.now_ms();
        runtime.sleep(20).await;
        assert!(runtime.now_ms() >= before + 15);
    }
}

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    mount_to_body(App);
}
