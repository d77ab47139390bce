//! Tidy output: one row per listing id, taken from the first provider result.

use crate::batch::load_checkpoints;
use crate::error::Result;
use crate::geocode::{ProviderPlace, ResolutionRecord};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
    pub id: String,
    /// Index of the source record among records with results. Rows sharing
    /// it were resolved from the same address pair.
    pub unique_address_group: usize,
    pub provider: String,
    pub place_name: String,
    pub place_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub plus_code: Option<String>,
    pub source: Option<String>,
    pub address_main: String,
    pub address_alt: String,
    pub trimmed_address: Option<String>,
    pub suggestion_address: Option<String>,
    pub suggestion_name: Option<String>,
    pub suggestion_place_id: Option<String>,
    pub suggestion_plus_code: Option<String>,
    pub suggestion_lat: Option<f64>,
    pub suggestion_lng: Option<f64>,
}

/// Flatten records in order. Records without results are dropped; results
/// from an unknown provider are skipped with a warning.
pub fn flatten_records(records: &[ResolutionRecord]) -> Vec<FlatRow> {
    let mut rows = Vec::new();

    for (group, record) in records.iter().filter(|r| !r.results.is_empty()).enumerate() {
        let place = match ProviderPlace::from_value(&record.results[0]) {
            Ok(place) => place,
            Err(e) => {
                warn!("Skipping result for '{}': {}", record.address_main, e);
                continue;
            }
        };
        let coordinates = match place.coordinates() {
            Ok(c) => c,
            Err(e) => {
                warn!("Skipping result for '{}': {}", record.address_main, e);
                continue;
            }
        };
        let suggestion = record.suggestion.as_ref();

        for id in &record.ids {
            rows.push(FlatRow {
                id: id.clone(),
                unique_address_group: group,
                provider: place.provider().to_string(),
                place_name: place.name(),
                place_id: place.place_id(),
                lat: coordinates.lat,
                lng: coordinates.lng,
                plus_code: place.plus_code(),
                source: record.source.clone(),
                address_main: record.address_main.clone(),
                address_alt: record.address_alt.clone(),
                trimmed_address: record.trimmed_address.clone(),
                suggestion_address: suggestion.map(|s| s.suggested_address.clone()),
                suggestion_name: suggestion.and_then(|s| s.name.clone()),
                suggestion_place_id: suggestion.and_then(|s| s.place_id.clone()),
                suggestion_plus_code: suggestion.and_then(|s| s.plus_code.clone()),
                suggestion_lat: suggestion.and_then(|s| s.geometry).map(|g| g.lat),
                suggestion_lng: suggestion.and_then(|s| s.geometry).map(|g| g.lng),
            });
        }
    }
    rows
}

/// Flatten every checkpoint file in `dir`.
pub fn flatten_dir(dir: &Path) -> Result<Vec<FlatRow>> {
    let records = load_checkpoints(dir)?;
    let rows = flatten_records(&records);
    info!("Flattened {} records into {} rows", records.len(), rows.len());
    Ok(rows)
}

pub fn write_json(rows: &[FlatRow], path: &Path) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(rows)?)?;
    Ok(())
}

pub fn write_csv(rows: &[FlatRow], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
