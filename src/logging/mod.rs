//! Console logging bootstrap.
//!
//! Installs a `log` backend that writes to the browser console exactly once per page.
//! Messages are metadata-only `event=... module=... status=...` lines; note text never
//! goes to the log.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::OnceLock;

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;
static ACTIVE_LEVEL: OnceLock<LevelFilter> = OnceLock::new();

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}: {}", record.level(), record.target(), record.args());
        write_line(record.level(), &line);
    }

    fn flush(&self) {}
}

#[cfg(target_arch = "wasm32")]
fn write_line(level: Level, line: &str) {
    let v = wasm_bindgen::JsValue::from_str(line);
    match level {
        Level::Error => web_sys::console::error_1(&v),
        Level::Warn => web_sys::console::warn_1(&v),
        Level::Info => web_sys::console::info_1(&v),
        Level::Debug | Level::Trace => web_sys::console::debug_1(&v),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn write_line(_level: Level, line: &str) {
    eprintln!("{line}");
}

pub(crate) fn parse_level(level: &str) -> Result<LevelFilter, String> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| format!("unsupported log level `{level}`"))
}

/// Initialize console logging.
///
/// Repeated calls with the same level are no-ops; a different level is rejected.
/// Never panics.
pub(crate) fn init_logging(level: &str) -> Result<(), String> {
    let requested = parse_level(level)?;

    let active = *ACTIVE_LEVEL.get_or_init(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(requested);
        }
        requested
    });

    if active != requested {
        return Err(format!(
            "logging already initialized with level `{active}`; refusing to switch to `{requested}`"
        ));
    }

    log::info!(
        "event=core_init module=logging status=ok level={} version={}",
        active,
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_accepts_known_levels() {
        assert_eq!(parse_level("debug"), Ok(LevelFilter::Debug));
        assert_eq!(parse_level(" WARN "), Ok(LevelFilter::Warn));
        assert_eq!(parse_level("off"), Ok(LevelFilter::Off));
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn test_init_logging_is_idempotent_and_rejects_level_switch() {
        assert!(init_logging("info").is_ok());
        assert!(init_logging("info").is_ok());
        let err = init_logging("trace").expect_err("level switch should be rejected");
        assert!(err.contains("refusing to switch"));
    }
}
