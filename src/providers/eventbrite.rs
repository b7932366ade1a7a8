use crate::error::{AggregatorError, Result};
use crate::providers::ProviderAdapter;
use crate::types::{RawEvent, SearchQuery};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument};

pub const EVENTBRITE_PROVIDER: &str = "eventbrite";
const DEFAULT_BASE_URL: &str = "https://www.eventbriteapi.com/v3";

/// Adapter for the Eventbrite event search API.
pub struct EventbriteAdapter {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl EventbriteAdapter {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_params(&self, query: &SearchQuery) -> Vec<(String, String)> {
        let mut params = vec![("expand".to_string(), "venue".to_string())];
        if let Some(keyword) = &query.keyword {
            params.push(("q".to_string(), keyword.clone()));
        }
        if let (Some(lat), Some(lng)) = (query.latitude, query.longitude) {
            params.push(("location.latitude".to_string(), lat.to_string()));
            params.push(("location.longitude".to_string(), lng.to_string()));
            params.push((
                "location.within".to_string(),
                format!("{}km", query.radius_km.round() as i64),
            ));
        }
        if let Some(start) = query.start_date {
            params.push((
                "start_date.range_start".to_string(),
                format!("{start}T00:00:00"),
            ));
        }
        if let Some(end) = query.end_date {
            params.push((
                "start_date.range_end".to_string(),
                format!("{end}T23:59:59"),
            ));
        }
        params
    }

    fn parse_event(&self, raw: &Value) -> Result<RawEvent> {
        let title = raw["name"]["text"]
            .as_str()
            .ok_or_else(|| AggregatorError::MissingField("name.text not found".into()))?;

        let mut event = RawEvent::new(title, EVENTBRITE_PROVIDER);

        event.description = raw["description"]["text"].as_str().map(|s| s.to_string());
        event.start_time = raw["start"]["utc"]
            .as_str()
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .or_else(|| DateTime::parse_from_rfc3339(&format!("{s}Z")).ok())
            })
            .map(|t| t.with_timezone(&Utc));

        let venue = &raw["venue"];
        event.venue_name = venue["name"].as_str().map(|s| s.to_string());
        event.address = venue["address"]["localized_address_display"]
            .as_str()
            .map(|s| s.to_string());
        event.latitude = venue["latitude"].as_str().and_then(|s| s.parse().ok());
        event.longitude = venue["longitude"].as_str().and_then(|s| s.parse().ok());

        event.category = raw["category"]["name"]
            .as_str()
            .or_else(|| raw["category_name"].as_str())
            .map(|s| s.to_lowercase());
        event.image_url = raw["logo"]["url"].as_str().map(|s| s.to_string());

        if let Some(url) = raw["url"].as_str() {
            event.ticket_urls.push(url.to_string());
        }

        // Search results expose only an is_free flag; a free event pins the
        // price range at zero, paid events leave it unknown.
        if raw["is_free"].as_bool() == Some(true) {
            event.min_price = Some(0.0);
            event.max_price = Some(0.0);
        }

        Ok(event)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for EventbriteAdapter {
    fn provider_id(&self) -> &'static str {
        EVENTBRITE_PROVIDER
    }

    #[instrument(skip(self, query))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawEvent>> {
        let url = format!("{}/events/search/", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&self.build_params(query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::Provider {
                message: format!("eventbrite returned HTTP {status}"),
            });
        }

        let data: Value = response.json().await?;
        let Some(raw_events) = data["events"].as_array() else {
            debug!("eventbrite returned no events");
            return Ok(Vec::new());
        };

        let mut events = Vec::with_capacity(raw_events.len());
        for raw in raw_events {
            match self.parse_event(raw) {
                Ok(event) => events.push(event),
                Err(e) => debug!("Skipping unparseable eventbrite event: {}", e),
            }
        }
        info!("Fetched {} events from Eventbrite", events.len());
        Ok(events)
    }

    async fn test_connection(&self) -> bool {
        let url = format!("{}/users/me/", self.base_url);
        self.client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
