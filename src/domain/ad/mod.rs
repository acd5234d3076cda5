//! Ad domain — creative types, validation, conversion.

pub mod wire;

use crate::shared::{AdId, CampaignId, ConsumerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A fully validated ad creative as selected by the backend.
///
/// Immutable once loaded for a given render cycle; owned exclusively by the
/// registry entry that loaded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdComponent {
    pub id: AdId,
    pub campaign_id: CampaignId,
    pub banner_url: String,
    pub target_url: String,
    pub description: String,
    pub consumer_id: Option<ConsumerId>,
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum AdValidationError {
    MissingId,
    MissingCampaignId,
    MissingBannerUrl,
    MissingDescription,
    InvalidBannerUrl(String),
    InvalidTargetUrl(String),
}

impl fmt::Display for AdValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdValidationError::MissingId => write!(f, "Missing ad id"),
            AdValidationError::MissingCampaignId => write!(f, "Missing campaign id"),
            AdValidationError::MissingBannerUrl => write!(f, "Missing banner URL"),
            AdValidationError::MissingDescription => write!(f, "Missing description"),
            AdValidationError::InvalidBannerUrl(url) => write!(f, "Invalid banner URL: {}", url),
            AdValidationError::InvalidTargetUrl(url) => write!(f, "Invalid target URL: {}", url),
        }
    }
}

impl std::error::Error for AdValidationError {}

/// Validate that a creative URL is absolute http(s) with a host.
///
/// Anything else is discarded before it can reach the presentation layer.
fn validate_creative_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
        }
        Err(_) => false,
    }
}

impl TryFrom<wire::AdResponse> for AdComponent {
    type Error = AdValidationError;

    fn try_from(resp: wire::AdResponse) -> Result<Self, Self::Error> {
        let id = resp
            .id
            .filter(|s| !s.is_empty())
            .ok_or(AdValidationError::MissingId)?;
        let campaign_id = resp
            .campaign_id
            .filter(|s| !s.is_empty())
            .ok_or(AdValidationError::MissingCampaignId)?;
        let banner_url = resp
            .banner_url
            .filter(|s| !s.is_empty())
            .ok_or(AdValidationError::MissingBannerUrl)?;
        let description = resp
            .description
            .filter(|s| !s.is_empty())
            .ok_or(AdValidationError::MissingDescription)?;
        let target_url = resp.target_url.unwrap_or_default();

        if !validate_creative_url(&banner_url) {
            return Err(AdValidationError::InvalidBannerUrl(banner_url));
        }
        if !validate_creative_url(&target_url) {
            return Err(AdValidationError::InvalidTargetUrl(target_url));
        }

        Ok(AdComponent {
            id: AdId::from(id),
            campaign_id: CampaignId::from(campaign_id),
            banner_url,
            target_url,
            description,
            consumer_id: resp.consumer_id.map(ConsumerId::from),
        })
    }
}
