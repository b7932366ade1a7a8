//! Collapses raw events describing the same real-world event into one
//! canonical record, tolerating title, venue and casing drift between
//! providers.

use crate::metrics::{emit_counter, MetricName};
use crate::types::{CanonicalEvent, ProviderResult, RawEvent};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// URL fragments that mark a stock/placeholder image rather than real artwork.
const PLACEHOLDER_MARKERS: &[&str] = &["placeholder", "default", "no-image", "noimage", "missing"];

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_ALNUM.replace_all(&lowered, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").to_string()
}

/// [`normalize`] plus stop-word removal, the loosest title form.
pub fn normalize_without_stop_words(text: &str) -> String {
    normalize(text)
        .split(' ')
        .filter(|w| !STOP_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn has_real_image(image_url: Option<&str>) -> bool {
    match image_url {
        Some(url) if !url.trim().is_empty() => {
            let lowered = url.to_lowercase();
            !PLACEHOLDER_MARKERS.iter().any(|m| lowered.contains(m))
        }
        _ => false,
    }
}

/// Candidate match keys for one event, strictest first. Any key collision
/// with an already-registered entry marks the event as a duplicate.
fn match_keys(event: &RawEvent) -> Vec<String> {
    let title = normalize(&event.title);
    let date = event
        .event_date()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "undated".to_string());

    let mut keys = Vec::with_capacity(3);
    if let Some(venue) = &event.venue_name {
        keys.push(format!("tdl:{}|{}|{}", title, date, normalize(venue)));
    }
    keys.push(format!("td:{}|{}", title, date));
    keys.push(format!(
        "ts:{}|{}",
        normalize_without_stop_words(&event.title),
        date
    ));
    keys
}

struct Entry {
    representative: RawEvent,
    keys: HashSet<String>,
    merged_from: Vec<String>,
}

/// True when the incoming record should replace the current representative.
/// First decisive criterion wins; full ties keep the current record.
fn prefer_incoming(incoming: &RawEvent, current: &RawEvent) -> bool {
    let incoming_image = has_real_image(incoming.image_url.as_deref());
    let current_image = has_real_image(current.image_url.as_deref());
    if incoming_image != current_image {
        return incoming_image;
    }

    let incoming_desc = incoming.description.as_deref().map_or(0, str::len);
    let current_desc = current.description.as_deref().map_or(0, str::len);
    if incoming_desc as f64 > current_desc as f64 * 1.5 {
        return true;
    }
    if current_desc as f64 > incoming_desc as f64 * 1.5 {
        return false;
    }

    let incoming_geo = incoming.latitude.is_some() && incoming.longitude.is_some();
    let current_geo = current.latitude.is_some() && current.longitude.is_some();
    if incoming_geo != current_geo {
        return incoming_geo;
    }

    incoming.ticket_urls.len() > current.ticket_urls.len()
}

/// Copy the loser's fields into the winner wherever the winner has a gap,
/// and union the purchase links.
fn absorb(winner: &mut RawEvent, loser: &RawEvent) {
    if winner.description.is_none() {
        winner.description = loser.description.clone();
    }
    if winner.start_time.is_none() {
        winner.start_time = loser.start_time;
    }
    if winner.venue_name.is_none() {
        winner.venue_name = loser.venue_name.clone();
    }
    if winner.address.is_none() {
        winner.address = loser.address.clone();
    }
    if winner.latitude.is_none() || winner.longitude.is_none() {
        winner.latitude = loser.latitude;
        winner.longitude = loser.longitude;
    }
    if winner.category.is_none() {
        winner.category = loser.category.clone();
    }
    if winner.min_price.is_none() {
        winner.min_price = loser.min_price;
    }
    if winner.max_price.is_none() {
        winner.max_price = loser.max_price;
    }
    if !has_real_image(winner.image_url.as_deref()) && has_real_image(loser.image_url.as_deref()) {
        winner.image_url = loser.image_url.clone();
    }
    for url in &loser.ticket_urls {
        if !winner.ticket_urls.contains(url) {
            winner.ticket_urls.push(url.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Merge all provider results into a duplicate-free set of canonical
    /// events. Output order is unspecified; ranking is the next stage.
    pub fn dedupe(&self, results: &[ProviderResult]) -> Vec<CanonicalEvent> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut registry: HashMap<String, usize> = HashMap::new();
        let mut input_count = 0usize;
        let mut merges = 0usize;

        for result in results {
            for event in &result.events {
                input_count += 1;
                let keys = match_keys(event);

                // First key hit wins; keys are ordered strictest first.
                let existing = keys.iter().find_map(|k| registry.get(k).copied());
                match existing {
                    Some(index) => {
                        merges += 1;
                        let entry = &mut entries[index];
                        debug!(
                            "Merging '{}' from {} into existing entry",
                            event.title, event.provider_id
                        );
                        if prefer_incoming(event, &entry.representative) {
                            let previous =
                                std::mem::replace(&mut entry.representative, event.clone());
                            absorb(&mut entry.representative, &previous);
                        } else {
                            absorb(&mut entry.representative, event);
                        }
                        if !entry.merged_from.contains(&event.provider_id) {
                            entry.merged_from.push(event.provider_id.clone());
                        }
                        for key in keys {
                            entry.keys.insert(key.clone());
                            registry.entry(key).or_insert(index);
                        }
                    }
                    None => {
                        let index = entries.len();
                        let mut key_set = HashSet::new();
                        for key in &keys {
                            key_set.insert(key.clone());
                            registry.insert(key.clone(), index);
                        }
                        entries.push(Entry {
                            representative: event.clone(),
                            keys: key_set,
                            merged_from: vec![event.provider_id.clone()],
                        });
                    }
                }
            }
        }

        emit_counter(MetricName::DedupInputEvents, input_count as u64);
        emit_counter(MetricName::DedupMerges, merges as u64);
        emit_counter(MetricName::DedupCanonicalEvents, entries.len() as u64);
        debug!(
            "Deduplicated {} raw events into {} canonical events ({} merges)",
            input_count,
            entries.len(),
            merges
        );

        entries
            .into_iter()
            .map(|entry| {
                let e = entry.representative;
                CanonicalEvent {
                    id: Uuid::new_v4(),
                    title: e.title,
                    description: e.description,
                    start_time: e.start_time,
                    venue_name: e.venue_name,
                    address: e.address,
                    latitude: e.latitude,
                    longitude: e.longitude,
                    category: e.category,
                    min_price: e.min_price,
                    max_price: e.max_price,
                    image_url: e.image_url,
                    ticket_urls: e.ticket_urls,
                    merged_from: entry.merged_from,
                    relevance_score: 0.0,
                }
            })
            .collect()
    }
}
