//! Validation and normalization of raw request parameters.
//!
//! Everything arrives as optional strings (query-string shaped) and is
//! coerced, range-checked and defaulted here. An invalid query is rejected
//! with the full list of problems before any provider is contacted.

use crate::error::{AggregatorError, Result};
use crate::types::{SearchQuery, SortOrder};
use chrono::NaiveDate;
use serde::Deserialize;
use sha2::{Digest, Sha256};

pub const DEFAULT_RADIUS_KM: f64 = 25.0;
pub const MAX_RADIUS_KM: f64 = 500.0;
pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Raw request parameters as received from the calling layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQueryParams {
    pub keyword: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Comma-separated category filter.
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub sort: Option<String>,
    pub force_refresh: Option<String>,
}

fn parse_f64(field: &str, raw: &str, errors: &mut Vec<String>) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            errors.push(format!("{field} must be a number, got '{raw}'"));
            None
        }
    }
}

fn parse_usize(field: &str, raw: &str, errors: &mut Vec<String>) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(format!("{field} must be a non-negative integer, got '{raw}'"));
            None
        }
    }
}

fn parse_date(field: &str, raw: &str, errors: &mut Vec<String>) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            errors.push(format!("{field} must be a YYYY-MM-DD date, got '{raw}'"));
            None
        }
    }
}

/// Validate and normalize raw parameters into a [`SearchQuery`].
///
/// Collects every problem rather than failing on the first one, so the
/// caller can report all of them at once.
pub fn validate(params: &RawQueryParams) -> Result<SearchQuery> {
    let mut errors = Vec::new();

    let keyword = params
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| k.to_lowercase());

    let latitude = params
        .lat
        .as_deref()
        .and_then(|raw| parse_f64("lat", raw, &mut errors));
    let longitude = params
        .lng
        .as_deref()
        .and_then(|raw| parse_f64("lng", raw, &mut errors));

    if let Some(lat) = latitude {
        if !(-90.0..=90.0).contains(&lat) {
            errors.push(format!("lat must be within [-90, 90], got {lat}"));
        }
    }
    if let Some(lng) = longitude {
        if !(-180.0..=180.0).contains(&lng) {
            errors.push(format!("lng must be within [-180, 180], got {lng}"));
        }
    }
    if latitude.is_some() != longitude.is_some() {
        errors.push("lat and lng must be supplied together".to_string());
    }

    let radius_km = match params
        .radius
        .as_deref()
        .and_then(|raw| parse_f64("radius", raw, &mut errors))
    {
        Some(r) if r <= 0.0 || r > MAX_RADIUS_KM => {
            errors.push(format!("radius must be within (0, {MAX_RADIUS_KM}], got {r}"));
            DEFAULT_RADIUS_KM
        }
        Some(r) => r,
        None => DEFAULT_RADIUS_KM,
    };

    let start_date = params
        .start_date
        .as_deref()
        .and_then(|raw| parse_date("start_date", raw, &mut errors));
    let end_date = params
        .end_date
        .as_deref()
        .and_then(|raw| parse_date("end_date", raw, &mut errors));
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start > end {
            errors.push(format!("start_date {start} is after end_date {end}"));
        }
    }

    let mut categories: Vec<String> = params
        .category
        .as_deref()
        .map(|c| {
            c.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    categories.sort();
    categories.dedup();

    let min_price = params
        .min_price
        .as_deref()
        .and_then(|raw| parse_f64("min_price", raw, &mut errors));
    let max_price = params
        .max_price
        .as_deref()
        .and_then(|raw| parse_f64("max_price", raw, &mut errors));
    if let Some(min) = min_price {
        if min < 0.0 {
            errors.push(format!("min_price must be non-negative, got {min}"));
        }
    }
    if let Some(max) = max_price {
        if max < 0.0 {
            errors.push(format!("max_price must be non-negative, got {max}"));
        }
    }
    if let (Some(min), Some(max)) = (min_price, max_price) {
        if min > max {
            errors.push(format!("min_price {min} is greater than max_price {max}"));
        }
    }

    let limit = match params
        .limit
        .as_deref()
        .and_then(|raw| parse_usize("limit", raw, &mut errors))
    {
        Some(l) if l == 0 || l > MAX_LIMIT => {
            errors.push(format!("limit must be within [1, {MAX_LIMIT}], got {l}"));
            DEFAULT_LIMIT
        }
        Some(l) => l,
        None => DEFAULT_LIMIT,
    };

    let offset = params
        .offset
        .as_deref()
        .and_then(|raw| parse_usize("offset", raw, &mut errors))
        .unwrap_or(0);

    let sort = match params.sort.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match SortOrder::parse(raw) {
            Some(s) => s,
            None => {
                errors.push(format!(
                    "sort must be one of date|distance|popularity|price|relevance, got '{raw}'"
                ));
                SortOrder::default()
            }
        },
        _ => SortOrder::default(),
    };

    let force_refresh = matches!(
        params.force_refresh.as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes")
    );

    if !errors.is_empty() {
        return Err(AggregatorError::Validation(errors));
    }

    Ok(SearchQuery {
        keyword,
        latitude,
        longitude,
        radius_km,
        start_date,
        end_date,
        categories,
        min_price,
        max_price,
        limit,
        offset,
        sort,
        force_refresh,
    })
}

/// Deterministic cache signature for a normalized query.
///
/// Pagination and `force_refresh` are deliberately excluded: the cache holds
/// the full ranked set and pagination is applied per request.
pub fn signature(query: &SearchQuery) -> String {
    let canonical = format!(
        "kw={}|lat={}|lng={}|r={:.3}|from={}|to={}|cat={}|pmin={}|pmax={}|sort={}",
        query.keyword.as_deref().unwrap_or(""),
        query.latitude.map(|v| format!("{v:.5}")).unwrap_or_default(),
        query.longitude.map(|v| format!("{v:.5}")).unwrap_or_default(),
        query.radius_km,
        query.start_date.map(|d| d.to_string()).unwrap_or_default(),
        query.end_date.map(|d| d.to_string()).unwrap_or_default(),
        query.categories.join(","),
        query.min_price.map(|v| format!("{v:.2}")).unwrap_or_default(),
        query.max_price.map(|v| format!("{v:.2}")).unwrap_or_default(),
        query.sort.as_str(),
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
