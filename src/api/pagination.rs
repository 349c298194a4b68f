//! Next-page extraction for the two pagination shapes the backend serves:
//! an HTTP `Link` response header carrying `rel="next"`, or a JSON:API body
//! field at `meta.pagination.next`. Either form yields an absolute URL.

use serde_json::Value;

/// Parse a `Link` header value and return the `rel="next"` target, if any.
///
/// Format: `<url1>; rel="current",<url2>; rel="next",...`
pub fn next_from_link_header(link: &str) -> Option<String> {
    for part in link.split(',') {
        let mut segments = part.split(';');
        let url_segment = segments.next()?.trim();
        let is_next = segments
            .any(|s| matches!(s.trim(), r#"rel="next""# | "rel=next"));
        if is_next {
            let url = url_segment.trim_start_matches('<').trim_end_matches('>');
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }
    }
    None
}

/// Return `meta.pagination.next` from a JSON:API response body, if present.
pub fn next_from_body(body: &Value) -> Option<String> {
    body.get("meta")?
        .get("pagination")?
        .get("next")?
        .as_str()
        .map(str::to_string)
}

/// Resolve the next-page URL from a response's header and body, preferring
/// the `Link` header when both are present.
pub fn next_page(link_header: Option<&str>, body: &Value) -> Option<String> {
    link_header
        .and_then(next_from_link_header)
        .or_else(|| next_from_body(body))
}
