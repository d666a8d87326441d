use crate::api::transport::ReqwestTransport;
use crate::api::ApiClient;
use crate::config::{EnvConfig, DEFAULT_LOG_LEVEL};
use crate::logging::init_logging;
use crate::pages::NotesPage;
use crate::runtime::BrowserRuntime;
use crate::state::{AppContext, AppState, NotesController};
use leptos::prelude::*;
use leptos_router::components::{Route, Router, Routes};
use leptos_router::path;
use std::sync::Arc;

/// Composition root: the only place the client and controller are constructed.
fn build_state() -> AppState {
    let config = EnvConfig::load(None);

    if let Err(e) = init_logging(&config.log_level) {
        let _ = init_logging(DEFAULT_LOG_LEVEL);
        log::warn!("event=core_init module=app status=degraded error={e}");
    }

    let runtime = Arc::new(BrowserRuntime);
    let client = ApiClient::new(
        config.client_config(),
        Arc::new(ReqwestTransport::new(reqwest::Client::new())),
        runtime.clone(),
    );
    let notes = NotesController::new(client, runtime, config.sync_timing());
    log::info!(
        "event=core_init module=app status=ok timeout_ms={} max_retries={}",
        config.timeout_ms,
        config.max_retries
    );

    AppState { notes, config }
}

#[component]
pub fn App() -> impl IntoView {
    let app_state = build_state();
    let notes = app_state.notes.clone();
    provide_context(AppContext(app_state));

    notes.start();
    on_cleanup(move || notes.dispose());

    view! {
        <Router>
            <Routes fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Not found"</div> }>
                <Route path=path!("") view=NotesPage />
            </Routes>
        </Router>
    }
}
