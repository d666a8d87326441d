use crate::api::ClientConfig;
use crate::state::SyncTiming;

pub(crate) const DEFAULT_TIMEOUT_MS: u32 = 12_000;
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 2;
pub(crate) const DEFAULT_RETRY_BASE_DELAY_MS: u32 = 250;
pub(crate) const DEFAULT_NOTICE_MS: u32 = 3_500;
pub(crate) const DEFAULT_AUTOSAVE_MS: u32 = 1_200;
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";

/// Runtime configuration for the notes client.
///
/// Base address resolution order: explicit override, then `window.ENV`, then the page's
/// own origin. Nothing here is hard-coded to a particular backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EnvConfig {
    pub api_url: String,
    pub timeout_ms: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u32,
    pub notice_ms: u32,
    pub autosave_ms: u32,
    pub log_level: String,
}

/// Raw values as found in `window.ENV`, before validation.
#[derive(Clone, Debug, Default)]
pub(crate) struct RawEnv {
    pub api_url: Option<String>,
    pub timeout_ms: Option<String>,
    pub max_retries: Option<String>,
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Read configuration from the browser environment.
    pub fn load(api_url_override: Option<String>) -> Self {
        let raw = read_window_env();
        let origin = web_sys::window().and_then(|w| w.location().origin().ok());
        Self::from_sources(api_url_override.as_deref(), raw, origin.as_deref())
    }

    pub fn from_sources(api_url_override: Option<&str>, raw: RawEnv, origin: Option<&str>) -> Self {
        let api_url = resolve_base_url(api_url_override, raw.api_url.as_deref(), origin);

        let timeout_ms = parse_setting("TIMEOUT_MS", raw.timeout_ms.as_deref())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let max_retries =
            parse_setting("MAX_RETRIES", raw.max_retries.as_deref()).unwrap_or(DEFAULT_MAX_RETRIES);

        let log_level = raw
            .log_level
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            api_url,
            timeout_ms,
            max_retries,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            notice_ms: DEFAULT_NOTICE_MS,
            autosave_ms: DEFAULT_AUTOSAVE_MS,
            log_level,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            timeout_ms: self.timeout_ms,
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
        }
    }

    pub fn sync_timing(&self) -> SyncTiming {
        SyncTiming {
            notice_ms: self.notice_ms,
            autosave_ms: self.autosave_ms,
        }
    }
}

/// First non-blank of override, environment, origin.
pub(crate) fn resolve_base_url(
    api_url_override: Option<&str>,
    env_api_url: Option<&str>,
    origin: Option<&str>,
) -> String {
    [api_url_override, env_api_url, origin]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn parse_setting(name: &str, raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v <= u32::MAX as f64 => Some(v as u32),
        _ => {
            log::warn!("event=config_invalid module=config key={name} value={raw:?}");
            None
        }
    }
}

fn read_window_env() -> RawEnv {
    let mut raw = RawEnv::default();

    let Some(window) = web_sys::window() else {
        return raw;
    };
    let Some(env) = window.get("ENV") else {
        return raw;
    };
    if env.is_undefined() || !env.is_object() {
        return raw;
    }

    let get = |key: &str| -> Option<String> {
        let v = js_sys::Reflect::get(&env, &key.into()).ok()?;
        v.as_string().or_else(|| v.as_f64().map(|n| n.to_string()))
    };

    // We support BOTH `window.ENV.API_URL` and the legacy lowercase `window.ENV.api_url`.
    raw.api_url = get("API_URL").or_else(|| get("api_url"));
    raw.timeout_ms = get("TIMEOUT_MS");
    raw.max_retries = get("MAX_RETRIES");
    raw.log_level = get("LOG_LEVEL");
    raw
}
