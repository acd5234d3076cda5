//! Publisher site resolution.
//!
//! The site id attributes all traffic and events to a publisher. An explicit
//! override always wins; otherwise it is derived from the hosting page's
//! domain. Resolution happens once at client construction and the result is
//! stable for the client's lifetime.

use crate::network::UNKNOWN_SITE_ID;
use crate::shared::SiteId;

/// Resolve the site id for the current page.
///
/// `explicit` is returned unchanged when configured. Otherwise the id is
/// derived from `page_host` (lowercased, port and `www.` prefix stripped).
/// With neither available, a fixed sentinel is returned so ad loading can
/// proceed and the backend can flag the traffic as unattributed.
pub fn detect_site_id(explicit: Option<&str>, page_host: Option<&str>) -> SiteId {
    if let Some(id) = explicit {
        let id = id.trim();
        if !id.is_empty() {
            return SiteId::from(id);
        }
    }

    match page_host.map(normalize_host) {
        Some(host) if !host.is_empty() => SiteId::from(host),
        _ => SiteId::from(UNKNOWN_SITE_ID),
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    let host = host.split(':').next().unwrap_or("");
    host.strip_prefix("www.").unwrap_or(host).to_string()
}
