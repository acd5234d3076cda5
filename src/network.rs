//! Network URL constants for the SovAds SDK.

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "https://api.sovads.network";

/// Site id used when neither an explicit override nor a page host is known.
pub const UNKNOWN_SITE_ID: &str = "unknown-site";
