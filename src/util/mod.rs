use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix for ids minted on the client. Such ids are final in local mode and
/// temporary while a create is in flight.
pub(crate) const LOCAL_ID_PREFIX: &str = "local-";

static LOCAL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn now_ms() -> i64 {
    js_sys::Date::now().round() as i64
}

/// Mint a client-side note id: `local-{time}-{seq}-{random}`.
///
/// The per-process counter alone keeps ids unique; the time and random parts keep them
/// distinct across reloads.
pub(crate) fn new_local_id(now_ms: i64) -> String {
    let seq = LOCAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    let mut bytes = [0u8; 4];
    if getrandom::getrandom(&mut bytes).is_err() {
        bytes = (seq as u32).rotate_left(16).to_le_bytes();
    }
    let random = u32::from_le_bytes(bytes);

    format!("{LOCAL_ID_PREFIX}{:x}-{:x}-{:08x}", now_ms.max(0), seq, random)
}

pub(crate) fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Join a base address and a resource path: base trailing slashes are stripped and the
/// path gets exactly one leading slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');
    format!("{base}/{path}")
}
