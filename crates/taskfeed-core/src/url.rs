use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::ids::TaskId;

/// Path segment encoding: everything but RFC 3986 unreserved characters.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const CHANNEL_PREFIX: &str = "/ws/data/";

/// Derive the progress channel endpoint for `task_id` from the REST base URL.
///
/// `http://host:8000/api` becomes `ws://host:8000/ws/data/{task_id}`.
pub fn channel_url(base_url: &str, task_id: &TaskId) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let base = base.strip_suffix("/api").unwrap_or(base);
    let base = base.trim_end_matches('/');

    let rewritten = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };

    let segment = utf8_percent_encode(task_id.as_str(), SEGMENT);
    format!("{rewritten}{CHANNEL_PREFIX}{segment}")
}
