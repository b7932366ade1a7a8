//! Relevance scoring and ordering of canonical events.

use crate::config::RankingConfig;
use crate::dedup::has_real_image;
use crate::metrics::{emit_histogram, MetricName};
use crate::types::{CanonicalEvent, SearchQuery, SortOrder};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

/// Great-circle distance between two coordinates, in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Scores events against the query context and orders them. The weights
/// are heuristics exposed through `[ranking]` config, not fixed rules.
#[derive(Debug, Clone)]
pub struct RelevanceRanker {
    weights: RankingConfig,
}

impl RelevanceRanker {
    pub fn new(weights: RankingConfig) -> Self {
        Self { weights }
    }

    fn distance_km(event: &CanonicalEvent, query: &SearchQuery) -> Option<f64> {
        match (query.latitude, query.longitude, event.latitude, event.longitude) {
            (Some(qlat), Some(qlng), Some(elat), Some(elng)) => {
                Some(haversine_km(qlat, qlng, elat, elng))
            }
            _ => None,
        }
    }

    /// Composite additive score, higher wins.
    pub fn score(&self, event: &CanonicalEvent, query: &SearchQuery, now: DateTime<Utc>) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        if let Some(distance) = Self::distance_km(event, query) {
            score += (w.distance_base - distance).max(0.0);
        }

        if let Some(keyword) = &query.keyword {
            if event.title.to_lowercase().contains(keyword) {
                score += w.keyword_title;
            }
            if event
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(keyword))
            {
                score += w.keyword_description;
            }
        }

        if !query.categories.is_empty() {
            if let Some(category) = &event.category {
                let category = category.to_lowercase();
                if query.categories.iter().any(|c| category.contains(c)) {
                    score += w.category_match;
                }
            }
        }

        if has_real_image(event.image_url.as_deref()) {
            score += w.image_quality;
        }

        if let Some(start) = event.start_time {
            let days_out = (start.date_naive() - now.date_naive()).num_days();
            if (0..=w.recency_horizon_days).contains(&days_out) {
                score += (w.recency_base - days_out as f64 / 3.0).max(0.0);
            }
        }

        score
    }

    /// Assign scores and order the set. The explicit sort preference, when
    /// not relevance-based, takes priority over the composite score; the
    /// score then only breaks ties. Sorting is stable, so equal events keep
    /// their input order.
    pub fn rank(&self, events: Vec<CanonicalEvent>, query: &SearchQuery) -> Vec<CanonicalEvent> {
        let started = std::time::Instant::now();
        let now = Utc::now();

        let mut scored: Vec<CanonicalEvent> = events
            .into_iter()
            .map(|mut event| {
                event.relevance_score = self.score(&event, query, now);
                event
            })
            .collect();

        let by_score_desc = |a: &CanonicalEvent, b: &CanonicalEvent| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        };

        match query.sort {
            // No provider supplies popularity data, so Popularity falls back
            // to the composite score.
            SortOrder::Relevance | SortOrder::Popularity => scored.sort_by(by_score_desc),
            SortOrder::Date => scored.sort_by(|a, b| {
                cmp_option(a.start_time, b.start_time).then_with(|| by_score_desc(a, b))
            }),
            SortOrder::Distance => scored.sort_by(|a, b| {
                cmp_option_f64(Self::distance_km(a, query), Self::distance_km(b, query))
                    .then_with(|| by_score_desc(a, b))
            }),
            SortOrder::Price => scored.sort_by(|a, b| {
                cmp_option_f64(a.min_price, b.min_price).then_with(|| by_score_desc(a, b))
            }),
        }

        emit_histogram(MetricName::RankingDuration, started.elapsed().as_secs_f64());
        debug!("Ranked {} events by {}", scored.len(), query.sort.as_str());
        scored
    }
}

/// Ascending with missing values last.
fn cmp_option<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_option_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{validate, RawQueryParams};
    use chrono::Duration;
    use uuid::Uuid;

    fn ranker() -> RelevanceRanker {
        RelevanceRanker::new(RankingConfig::default())
    }

    fn canonical(title: &str) -> CanonicalEvent {
        CanonicalEvent {
            id: Uuid::new_v4(),
            title: title.to_string(),
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
            merged_from: vec!["test".to_string()],
            relevance_score: 0.0,
        }
    }

    fn query(pairs: RawQueryParams) -> SearchQuery {
        validate(&pairs).unwrap()
    }

    #[test]
    fn haversine_known_distance() {
        // New York to Philadelphia is roughly 130 km.
        let d = haversine_km(40.7128, -74.0060, 39.9526, -75.1652);
        assert!((125.0..135.0).contains(&d), "got {d}");
    }

    #[test]
    fn closer_event_never_scores_lower() {
        let q = query(RawQueryParams {
            lat: Some("40.71".into()),
            lng: Some("-74.00".into()),
            ..Default::default()
        });

        let mut near = canonical("Show");
        near.latitude = Some(40.72);
        near.longitude = Some(-74.01);
        let mut far = canonical("Show");
        far.latitude = Some(40.95);
        far.longitude = Some(-74.60);

        let r = ranker();
        let now = Utc::now();
        assert!(r.score(&near, &q, now) >= r.score(&far, &q, now));
    }

    #[test]
    fn keyword_in_title_and_description_both_count() {
        let q = query(RawQueryParams {
            keyword: Some("jazz".into()),
            ..Default::default()
        });
        let r = ranker();
        let now = Utc::now();

        let plain = canonical("Rock Show");
        let mut titled = canonical("Jazz Night");
        let mut both = canonical("Jazz Night");
        both.description = Some("The finest jazz in town".to_string());
        titled.description = Some("A night of music".to_string());

        let s_plain = r.score(&plain, &q, now);
        let s_titled = r.score(&titled, &q, now);
        let s_both = r.score(&both, &q, now);
        assert_eq!(s_titled - s_plain, 30.0);
        assert_eq!(s_both - s_titled, 10.0);
    }

    #[test]
    fn category_substring_matches() {
        let q = query(RawQueryParams {
            category: Some("music".into()),
            ..Default::default()
        });
        let mut event = canonical("Show");
        event.category = Some("Live Music".to_string());
        assert_eq!(ranker().score(&event, &q, Utc::now()), 25.0);
    }

    #[test]
    fn recency_decays_and_cuts_off() {
        let q = query(RawQueryParams::default());
        let r = ranker();
        let now = Utc::now();

        let mut soon = canonical("Show");
        soon.start_time = Some(now + Duration::days(3));
        let mut distant = canonical("Show");
        distant.start_time = Some(now + Duration::days(45));

        assert!(r.score(&soon, &q, now) > 0.0);
        assert_eq!(r.score(&distant, &q, now), 0.0);
    }

    #[test]
    fn relevance_sort_is_descending_and_stable() {
        let q = query(RawQueryParams {
            keyword: Some("jazz".into()),
            ..Default::default()
        });
        let first_plain = canonical("Quiet Evening");
        let second_plain = canonical("Another Evening");
        let jazz = canonical("Jazz Night");

        let ranked = ranker().rank(vec![first_plain.clone(), second_plain.clone(), jazz], &q);
        assert_eq!(ranked[0].title, "Jazz Night");
        // Tied zero-score events keep their input order.
        assert_eq!(ranked[1].title, "Quiet Evening");
        assert_eq!(ranked[2].title, "Another Evening");
    }

    #[test]
    fn explicit_price_sort_overrides_score() {
        let q = query(RawQueryParams {
            keyword: Some("jazz".into()),
            sort: Some("price".into()),
            ..Default::default()
        });

        let mut pricey_match = canonical("Jazz Night");
        pricey_match.min_price = Some(80.0);
        let mut cheap_other = canonical("Open Mic");
        cheap_other.min_price = Some(5.0);

        let ranked = ranker().rank(vec![pricey_match, cheap_other], &q);
        assert_eq!(ranked[0].title, "Open Mic");
    }

    #[test]
    fn date_sort_puts_undated_last() {
        let q = query(RawQueryParams {
            sort: Some("date".into()),
            ..Default::default()
        });
        let undated = canonical("Mystery");
        let mut dated = canonical("Scheduled");
        dated.start_time = Some(Utc::now() + Duration::days(10));

        let ranked = ranker().rank(vec![undated, dated], &q);
        assert_eq!(ranked[0].title, "Scheduled");
    }
}
