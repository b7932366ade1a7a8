use crate::error::{AggregatorError, Result};
use crate::providers::ProviderAdapter;
use crate::types::{RawEvent, SearchQuery};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument};

pub const TICKETMASTER_PROVIDER: &str = "ticketmaster";
const DEFAULT_BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2";

/// Adapter for the Ticketmaster Discovery API.
pub struct TicketmasterAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TicketmasterAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_params(&self, query: &SearchQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("apikey".to_string(), self.api_key.clone()),
            ("size".to_string(), "100".to_string()),
        ];
        if let Some(keyword) = &query.keyword {
            params.push(("keyword".to_string(), keyword.clone()));
        }
        if let (Some(lat), Some(lng)) = (query.latitude, query.longitude) {
            params.push(("latlong".to_string(), format!("{lat},{lng}")));
            params.push(("radius".to_string(), format!("{}", query.radius_km.round() as i64)));
            params.push(("unit".to_string(), "km".to_string()));
        }
        if let Some(start) = query.start_date {
            params.push((
                "startDateTime".to_string(),
                format!("{start}T00:00:00Z"),
            ));
        }
        if let Some(end) = query.end_date {
            params.push(("endDateTime".to_string(), format!("{end}T23:59:59Z")));
        }
        // Discovery accepts classificationName repeatedly, one per category.
        for category in &query.categories {
            params.push(("classificationName".to_string(), category.clone()));
        }
        params
    }

    fn parse_event(&self, raw: &Value) -> Result<RawEvent> {
        let title = raw["name"]
            .as_str()
            .ok_or_else(|| AggregatorError::MissingField("name not found".into()))?;

        let mut event = RawEvent::new(title, TICKETMASTER_PROVIDER);

        event.description = raw["info"]
            .as_str()
            .or_else(|| raw["description"].as_str())
            .map(|s| s.to_string());
        event.start_time = raw["dates"]["start"]["dateTime"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        if let Some(venue) = raw["_embedded"]["venues"].get(0) {
            event.venue_name = venue["name"].as_str().map(|s| s.to_string());
            event.address = venue["address"]["line1"].as_str().map(|s| s.to_string());
            event.latitude = venue["location"]["latitude"]
                .as_str()
                .and_then(|s| s.parse().ok());
            event.longitude = venue["location"]["longitude"]
                .as_str()
                .and_then(|s| s.parse().ok());
        }

        event.category = raw["classifications"]
            .get(0)
            .and_then(|c| c["segment"]["name"].as_str())
            .map(|s| s.to_lowercase());

        if let Some(price_range) = raw["priceRanges"].get(0) {
            event.min_price = price_range["min"].as_f64();
            event.max_price = price_range["max"].as_f64();
        }

        event.image_url = raw["images"]
            .as_array()
            .and_then(|imgs| imgs.first())
            .and_then(|img| img["url"].as_str())
            .map(|s| s.to_string());

        if let Some(url) = raw["url"].as_str() {
            event.ticket_urls.push(url.to_string());
        }

        Ok(event)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for TicketmasterAdapter {
    fn provider_id(&self) -> &'static str {
        TICKETMASTER_PROVIDER
    }

    #[instrument(skip(self, query))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawEvent>> {
        let url = format!("{}/events.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&self.build_params(query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::Provider {
                message: format!("ticketmaster returned HTTP {status}"),
            });
        }

        let data: Value = response.json().await?;
        // No _embedded block means zero matches, which is a valid result.
        let Some(raw_events) = data["_embedded"]["events"].as_array() else {
            debug!("ticketmaster returned no events");
            return Ok(Vec::new());
        };

        let mut events = Vec::with_capacity(raw_events.len());
        for raw in raw_events {
            match self.parse_event(raw) {
                Ok(event) => events.push(event),
                Err(e) => debug!("Skipping unparseable ticketmaster event: {}", e),
            }
        }
        info!("Fetched {} events from Ticketmaster", events.len());
        Ok(events)
    }

    async fn test_connection(&self) -> bool {
        let url = format!("{}/events.json", self.base_url);
        self.client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str()), ("size", "1")])
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
