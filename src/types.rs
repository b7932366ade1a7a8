use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Sort preference carried by a validated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Date,
    Distance,
    Popularity,
    Price,
    #[default]
    Relevance,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "date" => Some(Self::Date),
            "distance" => Some(Self::Distance),
            "popularity" => Some(Self::Popularity),
            "price" => Some(Self::Price),
            "relevance" => Some(Self::Relevance),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Distance => "distance",
            Self::Popularity => "popularity",
            Self::Price => "price",
            Self::Relevance => "relevance",
        }
    }
}

/// Normalized, validated search request. Only `query::validate` constructs
/// these from raw parameters; the pipeline never sees unchecked input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Search radius in kilometres.
    pub radius_km: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub categories: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub limit: usize,
    pub offset: usize,
    pub sort: SortOrder,
    /// Bypass the result cache for this call (read and write).
    pub force_refresh: bool,
}

/// Outcome classification for one provider call within a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Timeout,
    Error,
    RateLimited,
    CircuitOpen,
}

/// Provider-native event record. Anything beyond the title may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub title: String,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub image_url: Option<String>,
    pub ticket_urls: Vec<String>,
    pub provider_id: String,
}

impl RawEvent {
    /// Minimal constructor used by adapters and tests; optional fields start empty.
    pub fn new(title: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            start_time: None,
            venue_name: None,
            address: None,
            latitude: None,
            longitude: None,
            category: None,
            min_price: None,
            max_price: None,
            image_url: None,
            ticket_urls: Vec::new(),
            provider_id: provider_id.into(),
        }
    }

    pub fn event_date(&self) -> Option<NaiveDate> {
        self.start_time.map(|t| t.date_naive())
    }
}

/// The raw output of one adapter call, immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider_id: String,
    pub status: ProviderStatus,
    pub events: Vec<RawEvent>,
}

impl ProviderResult {
    pub fn ok(provider_id: impl Into<String>, events: Vec<RawEvent>) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: ProviderStatus::Ok,
            events,
        }
    }

    /// Empty result carrying a failure classification.
    pub fn failed(provider_id: impl Into<String>, status: ProviderStatus) -> Self {
        Self {
            provider_id: provider_id.into(),
            status,
            events: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ProviderStatus::Ok
    }
}

/// Deduplicated, merged representation of one real-world event.
/// Never mutated after ranking assigns `relevance_score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub image_url: Option<String>,
    pub ticket_urls: Vec<String>,
    /// Provider tags that contributed records to this event.
    pub merged_from: Vec<String>,
    pub relevance_score: f64,
}

/// Outbound contract returned to the calling layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub events: Vec<CanonicalEvent>,
    pub total_count: usize,
    pub has_more: bool,
    /// Per-provider event counts, zero for providers that failed.
    pub sources: HashMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
