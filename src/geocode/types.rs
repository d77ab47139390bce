//! Core types for the geocoding subsystem.

use crate::address::Side;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The geocoding backend a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    GoogleMaps,
    Nominatim,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoogleMaps => write!(f, "Google Maps"),
            Self::Nominatim => write!(f, "Nominatim"),
        }
    }
}

/// One distinct provider endpoint. Part of every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCall {
    GoogleGeocode,
    GoogleAutocomplete,
    GoogleFindPlace,
    Nominatim,
}

impl ProviderCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleGeocode => "google_geocode",
            Self::GoogleAutocomplete => "google_autocomplete",
            Self::GoogleFindPlace => "google_find_place",
            Self::Nominatim => "nominatim",
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Nominatim => ProviderKind::Nominatim,
            _ => ProviderKind::GoogleMaps,
        }
    }
}

impl fmt::Display for ProviderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which Google API produces the "did you mean" suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestMode {
    #[default]
    Autocomplete,
    Search,
}

impl SuggestMode {
    pub fn call(&self) -> ProviderCall {
        match self {
            Self::Autocomplete => ProviderCall::GoogleAutocomplete,
            Self::Search => ProviderCall::GoogleFindPlace,
        }
    }
}

impl fmt::Display for SuggestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Autocomplete => write!(f, "autocomplete"),
            Self::Search => write!(f, "search"),
        }
    }
}

impl FromStr for SuggestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "autocomplete" => Ok(Self::Autocomplete),
            "search" => Ok(Self::Search),
            other => Err(format!("unknown suggestion API '{}'", other)),
        }
    }
}

/// One logical place, referenced by one or more listing ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressQuery {
    pub main: String,
    pub alternative: String,
    pub mode: SuggestMode,
    pub ids: Vec<String>,
}

impl AddressQuery {
    pub fn new(main: impl Into<String>, alternative: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            alternative: alternative.into(),
            mode: SuggestMode::default(),
            ids: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: SuggestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A provider's single best correction of a free-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggested_address: String,
    #[serde(default)]
    pub geometry: Option<Coordinates>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub plus_code: Option<String>,
}

impl Suggestion {
    pub fn new(suggested_address: impl Into<String>) -> Self {
        Self {
            suggested_address: suggested_address.into(),
            geometry: None,
            name: None,
            place_id: None,
            plus_code: None,
        }
    }
}

/// Which state of the resolution machine produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Direct,
    Relax,
}

/// Terminal state of one address query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    /// Valid input, but no provider matched any candidate.
    #[default]
    Empty,
    /// Rejected before any provider call.
    Invalid,
}

/// A successful match for one address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub provider: ProviderKind,
    /// Strategy name, e.g. `gmaps_robust[search]` or `nominatim`.
    pub source: String,
    pub raw_results: Vec<Value>,
    pub suggestion: Option<Suggestion>,
    /// The query that matched, after normalization and trimming.
    pub matched_candidate: String,
    pub stage: Stage,
    pub trim_side: Option<Side>,
}

/// Persisted outcome for one [`AddressQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub address_main: String,
    pub address_alt: String,
    pub ids: Vec<String>,
    pub results: Vec<Value>,
    pub source: Option<String>,
    pub suggestion: Option<Suggestion>,
    pub trimmed_address: Option<String>,
    #[serde(default)]
    pub status: Outcome,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub trim_side: Option<Side>,
}

impl ResolutionRecord {
    fn blank(query: &AddressQuery, status: Outcome) -> Self {
        Self {
            address_main: query.main.clone(),
            address_alt: query.alternative.clone(),
            ids: query.ids.clone(),
            results: Vec::new(),
            source: None,
            suggestion: None,
            trimmed_address: None,
            status,
            stage: None,
            trim_side: None,
        }
    }

    pub fn empty(query: &AddressQuery) -> Self {
        Self::blank(query, Outcome::Empty)
    }

    pub fn invalid(query: &AddressQuery) -> Self {
        Self::blank(query, Outcome::Invalid)
    }

    pub fn success(query: &AddressQuery, result: GeocodeResult) -> Self {
        Self {
            results: result.raw_results,
            source: Some(result.source),
            suggestion: result.suggestion,
            trimmed_address: Some(result.matched_candidate),
            status: Outcome::Success,
            stage: Some(result.stage),
            trim_side: result.trim_side,
            ..Self::blank(query, Outcome::Success)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Outcome::Success && !self.results.is_empty()
    }
}

/// Failures of a single provider call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },
    #[error("Quota exceeded: {0}")]
    Quota(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: String, message: String },
    #[error("Location not supported by provider: {0}")]
    UnsupportedLocation(String),
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
    #[error("Cancelled")]
    Cancelled,
}

impl GeocodeError {
    /// Transient failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Quota(_) => true,
            Self::Status { code, .. } => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::Rejected { status, .. } => status == "UNKNOWN_ERROR",
            Self::UnsupportedLocation(_) | Self::InvalidResponse(_) | Self::Cancelled => false,
        }
    }

    /// Failures that go away only on a different network path.
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, Self::UnsupportedLocation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_mode_parse() {
        assert_eq!("search".parse::<SuggestMode>().unwrap(), SuggestMode::Search);
        assert_eq!(" Autocomplete ".parse::<SuggestMode>().unwrap(), SuggestMode::Autocomplete);
        assert!("places".parse::<SuggestMode>().is_err());
        assert_eq!(SuggestMode::Search.call(), ProviderCall::GoogleFindPlace);
    }

    #[test]
    fn test_provider_call_kind() {
        assert_eq!(ProviderCall::Nominatim.kind(), ProviderKind::Nominatim);
        assert_eq!(ProviderCall::GoogleFindPlace.kind(), ProviderKind::GoogleMaps);
        assert_eq!(ProviderCall::GoogleAutocomplete.to_string(), "google_autocomplete");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GeocodeError::Transport("reset".into()).is_retryable());
        assert!(GeocodeError::Status { code: 503, message: String::new() }.is_retryable());
        assert!(GeocodeError::Status { code: 429, message: String::new() }.is_retryable());
        assert!(!GeocodeError::Status { code: 404, message: String::new() }.is_retryable());
        assert!(GeocodeError::Quota("OVER_QUERY_LIMIT".into()).is_retryable());
        let denied = GeocodeError::Rejected { status: "REQUEST_DENIED".into(), message: String::new() };
        assert!(!denied.is_retryable());
        let unknown = GeocodeError::Rejected { status: "UNKNOWN_ERROR".into(), message: String::new() };
        assert!(unknown.is_retryable());
        assert!(!GeocodeError::Cancelled.is_retryable());
        assert!(GeocodeError::UnsupportedLocation("x".into()).needs_reconnect());
    }

    #[test]
    fn test_record_serialization_shape() {
        let query = AddressQuery::new("Bole", "").with_ids(["a1", "a2"]);
        let record = ResolutionRecord::empty(&query);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["address_main"], "Bole");
        assert_eq!(json["ids"], serde_json::json!(["a1", "a2"]));
        assert_eq!(json["results"], serde_json::json!([]));
        assert!(json["source"].is_null());
        assert!(json["suggestion"].is_null());
        assert!(json["trimmed_address"].is_null());
        assert_eq!(json["status"], "empty");
    }

    #[test]
    fn test_record_reads_legacy_output() {
        // Records written without status/stage/trim_side fields.
        let json = r#"{
            "address_main": "Bole", "address_alt": "", "ids": ["1"],
            "results": [{"osm_id": 5}], "source": "geocode_nominatim",
            "suggestion": null, "trimmed_address": "bole"
        }"#;
        let record: ResolutionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, Outcome::Empty);
        assert!(record.stage.is_none());
        assert_eq!(record.results.len(), 1);
    }

    #[test]
    fn test_success_record() {
        let query = AddressQuery::new("ቦሌ", "").with_ids(["7"]);
        let record = ResolutionRecord::success(
            &query,
            GeocodeResult {
                provider: ProviderKind::Nominatim,
                source: "nominatim".into(),
                raw_results: vec![serde_json::json!({"osm_id": 1})],
                suggestion: None,
                matched_candidate: "ቦሌ".into(),
                stage: Stage::Relax,
                trim_side: Some(Side::Left),
            },
        );
        assert!(record.is_success());
        assert_eq!(record.stage, Some(Stage::Relax));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["trim_side"], "left");
        assert_eq!(json["status"], "success");
    }
}
