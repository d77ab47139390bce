//! Geocoding providers: Google Maps (geocode, autocomplete, find place) and
//! OpenStreetMap Nominatim.
//!
//! Each call issues exactly one HTTP request. Retries, pacing and caching
//! belong to the resolver.

use super::types::{Coordinates, GeocodeError, ProviderKind, SuggestMode, Suggestion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────

/// A lat/lng rectangle used to bias or restrict results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub const ADDIS_ABABA: BoundingBox = BoundingBox {
        south: 8.7825,
        west: 38.5951,
        north: 9.2320,
        east: 38.9760,
    };

    /// Geocoding API `bounds`: `south,west|north,east`.
    pub fn google_bounds(&self) -> String {
        format!("{},{}|{},{}", self.south, self.west, self.north, self.east)
    }

    /// Places API `locationbias` / `locationrestriction`.
    pub fn google_rectangle(&self) -> String {
        format!("rectangle:{}", self.google_bounds())
    }

    /// Nominatim `viewbox`: `west,south,east,north`.
    pub fn nominatim_viewbox(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::ADDIS_ABABA
    }
}

/// Everything a provider client needs to know about the target area and
/// the endpoints it talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub bounds: BoundingBox,
    pub country: String,
    pub admin_area: String,
    pub region: String,
    pub language: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Sent to Nominatim so the operators can reach us about heavy use.
    pub contact_email: Option<String>,
    pub google_geocode_url: String,
    pub google_autocomplete_url: String,
    pub google_find_place_url: String,
    pub nominatim_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            bounds: BoundingBox::ADDIS_ABABA,
            country: "ET".into(),
            admin_area: "Addis Ababa".into(),
            region: "et".into(),
            language: "en-US".into(),
            user_agent: concat!("AddisGeocoder/", env!("CARGO_PKG_VERSION")).into(),
            timeout_secs: 20,
            contact_email: None,
            google_geocode_url: "https://maps.googleapis.com/maps/api/geocode/json".into(),
            google_autocomplete_url: "https://maps.googleapis.com/maps/api/place/autocomplete/json"
                .into(),
            google_find_place_url:
                "https://maps.googleapis.com/maps/api/place/findplacefromtext/json".into(),
            nominatim_url: "https://nominatim.openstreetmap.org/search".into(),
        }
    }
}

// ─── Provider capability ────────────────────────────────────────

/// The provider calls the resolver depends on.
pub trait GeocodingApi {
    /// Forward geocode. Zero matches is `Ok(vec![])`.
    fn geocode_google(&self, key: &str, address: &str) -> Result<Vec<Value>, GeocodeError>;

    /// Best "did you mean" correction for a free-text query.
    fn suggest_google(
        &self,
        key: &str,
        address: &str,
        mode: SuggestMode,
    ) -> Result<Option<Suggestion>, GeocodeError>;

    /// OSM search. Zero matches is `Ok(vec![])`.
    fn search_nominatim(&self, address: &str, limit: usize) -> Result<Vec<Value>, GeocodeError>;
}

// ─── HTTP client ────────────────────────────────────────────────

/// Blocking HTTP implementation of [`GeocodingApi`].
pub struct HttpGeocodingApi {
    agent: ureq::Agent,
    config: ProviderConfig,
}

impl HttpGeocodingApi {
    pub fn new(config: ProviderConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build();
        Self { agent, config }
    }

    fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, GeocodeError> {
        let mut request = self.agent.get(url);
        for (name, value) in params {
            request = request.query(name, value);
        }

        match request.call() {
            Ok(response) => response
                .into_json::<Value>()
                .map_err(|e| GeocodeError::InvalidResponse(e.to_string())),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(classify_status(code, body))
            }
            Err(ureq::Error::Transport(t)) => Err(GeocodeError::Transport(t.to_string())),
        }
    }
}

impl GeocodingApi for HttpGeocodingApi {
    fn geocode_google(&self, key: &str, address: &str) -> Result<Vec<Value>, GeocodeError> {
        let bounds = self.config.bounds.google_bounds();
        let components = format!(
            "country:{}|administrative_area:{}",
            self.config.country, self.config.admin_area
        );
        let body = self.get_json(
            &self.config.google_geocode_url,
            &[
                ("key", key),
                ("address", address),
                ("bounds", bounds.as_str()),
                ("components", components.as_str()),
                ("region", self.config.region.as_str()),
                ("language", self.config.language.as_str()),
            ],
        )?;
        parse_google_results(&body)
    }

    fn suggest_google(
        &self,
        key: &str,
        address: &str,
        mode: SuggestMode,
    ) -> Result<Option<Suggestion>, GeocodeError> {
        let rectangle = self.config.bounds.google_rectangle();
        let body = match mode {
            SuggestMode::Autocomplete => {
                let components = format!("country:{}", self.config.country.to_lowercase());
                self.get_json(
                    &self.config.google_autocomplete_url,
                    &[
                        ("key", key),
                        ("input", address),
                        ("components", components.as_str()),
                        ("locationrestriction", rectangle.as_str()),
                        ("strictbounds", "true"),
                        ("language", self.config.language.as_str()),
                    ],
                )?
            }
            SuggestMode::Search => self.get_json(
                &self.config.google_find_place_url,
                &[
                    ("key", key),
                    ("input", address),
                    ("inputtype", "textquery"),
                    ("fields", "formatted_address,name,geometry,plus_code,place_id"),
                    ("locationbias", rectangle.as_str()),
                    ("language", self.config.language.as_str()),
                ],
            )?,
        };
        parse_suggestion(&body, mode)
    }

    fn search_nominatim(&self, address: &str, limit: usize) -> Result<Vec<Value>, GeocodeError> {
        let limit = limit.to_string();
        let viewbox = self.config.bounds.nominatim_viewbox();
        let mut params = vec![
            ("q", address),
            ("format", "json"),
            ("addressdetails", "1"),
            ("namedetails", "1"),
            ("countrycodes", self.config.country.as_str()),
            ("limit", limit.as_str()),
            ("viewbox", viewbox.as_str()),
            ("bounded", "1"),
            ("layer", "address,poi,railway,natural,manmade"),
            ("accept-language", self.config.language.as_str()),
        ];
        if let Some(email) = &self.config.contact_email {
            params.push(("email", email.as_str()));
        }

        let body = self.get_json(&self.config.nominatim_url, &params)?;
        parse_nominatim_results(body)
    }
}

// ─── Response parsing ───────────────────────────────────────────

/// Map a non-2xx HTTP response to an error.
pub fn classify_status(code: u16, body: String) -> GeocodeError {
    if code == 400 && body.to_lowercase().contains("location is not supported") {
        return GeocodeError::UnsupportedLocation(body);
    }
    GeocodeError::Status { code, message: body }
}

/// Google reports most failures in the body of a 200 response.
fn check_google_status(body: &Value) -> Result<(), GeocodeError> {
    let status = match body.get("status").and_then(Value::as_str) {
        Some(s) => s,
        None => return Ok(()),
    };
    let message = body
        .get("error_message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "OVER_QUERY_LIMIT" => Err(GeocodeError::Quota(message)),
        other => Err(GeocodeError::Rejected { status: other.to_string(), message }),
    }
}

pub fn parse_google_results(body: &Value) -> Result<Vec<Value>, GeocodeError> {
    check_google_status(body)?;
    match body.get("results") {
        Some(Value::Array(results)) => Ok(results.clone()),
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(_) => Err(GeocodeError::InvalidResponse("'results' is not a list".into())),
    }
}

pub fn parse_nominatim_results(body: Value) -> Result<Vec<Value>, GeocodeError> {
    match body {
        Value::Array(results) => Ok(results),
        _ => Err(GeocodeError::InvalidResponse("expected a JSON list from Nominatim".into())),
    }
}

/// First prediction (autocomplete) or candidate (find place) as a suggestion.
pub fn parse_suggestion(body: &Value, mode: SuggestMode) -> Result<Option<Suggestion>, GeocodeError> {
    check_google_status(body)?;
    let (list_key, text_key) = match mode {
        SuggestMode::Autocomplete => ("predictions", "description"),
        SuggestMode::Search => ("candidates", "formatted_address"),
    };

    let first = match body.get(list_key).and_then(Value::as_array).and_then(|l| l.first()) {
        Some(first) => first,
        None => return Ok(None),
    };
    let text = match first.get(text_key).and_then(Value::as_str) {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Ok(None),
    };

    let str_at = |path: &[&str]| -> Option<String> {
        path.iter()
            .try_fold(first, |v, key| v.get(key))
            .and_then(Value::as_str)
            .map(String::from)
    };

    Ok(Some(Suggestion {
        suggested_address: text.to_string(),
        geometry: first
            .pointer("/geometry/location")
            .and_then(|loc| serde_json::from_value(loc.clone()).ok()),
        name: str_at(&["name"]).or_else(|| str_at(&["structured_formatting", "main_text"])),
        place_id: str_at(&["place_id"]),
        plus_code: str_at(&["plus_code", "global_code"]),
    }))
}

// ─── Typed views of raw results ─────────────────────────────────

#[derive(Deserialize, Debug, Clone)]
pub struct GooglePlusCode {
    pub global_code: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GoogleGeometry {
    pub location: Coordinates,
}

/// A Google geocoding result.
#[derive(Deserialize, Debug, Clone)]
pub struct GooglePlace {
    pub formatted_address: String,
    pub place_id: String,
    pub geometry: GoogleGeometry,
    #[serde(default)]
    pub plus_code: Option<GooglePlusCode>,
}

/// A Nominatim search result.
#[derive(Deserialize, Debug, Clone)]
pub struct NominatimPlace {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub place_id: Option<Value>,
}

/// A raw provider result, told apart by provider-native fields.
#[derive(Debug, Clone)]
pub enum ProviderPlace {
    Google(GooglePlace),
    Osm(NominatimPlace),
}

impl ProviderPlace {
    /// `address_components` marks a Google result, `osm_id` a Nominatim one.
    pub fn from_value(raw: &Value) -> Result<Self, GeocodeError> {
        let invalid = |e: serde_json::Error| GeocodeError::InvalidResponse(e.to_string());
        if raw.get("address_components").is_some() {
            serde_json::from_value(raw.clone()).map(Self::Google).map_err(invalid)
        } else if raw.get("osm_id").is_some() {
            serde_json::from_value(raw.clone()).map(Self::Osm).map_err(invalid)
        } else {
            Err(GeocodeError::InvalidResponse("unrecognised provider result".into()))
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Google(_) => ProviderKind::GoogleMaps,
            Self::Osm(_) => ProviderKind::Nominatim,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Google(p) => p.formatted_address.clone(),
            Self::Osm(p) => p
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| p.display_name.clone()),
        }
    }

    pub fn place_id(&self) -> Option<String> {
        match self {
            Self::Google(p) => Some(p.place_id.clone()),
            Self::Osm(p) => match &p.place_id {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        }
    }

    pub fn coordinates(&self) -> Result<Coordinates, GeocodeError> {
        match self {
            Self::Google(p) => Ok(p.geometry.location),
            Self::Osm(p) => {
                let parse = |s: &str| {
                    s.parse::<f64>()
                        .map_err(|e| GeocodeError::InvalidResponse(format!("bad coordinate '{}': {}", s, e)))
                };
                Ok(Coordinates { lat: parse(&p.lat)?, lng: parse(&p.lon)? })
            }
        }
    }

    pub fn plus_code(&self) -> Option<String> {
        match self {
            Self::Google(p) => p.plus_code.as_ref().and_then(|c| c.global_code.clone()),
            Self::Osm(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn google_result() -> Value {
        json!({
            "address_components": [{"long_name": "Bole", "types": ["sublocality"]}],
            "formatted_address": "Bole Bulbula, Addis Ababa, Ethiopia",
            "place_id": "ChIJabc",
            "geometry": {"location": {"lat": 8.9606, "lng": 38.7872}},
            "plus_code": {"global_code": "6GXQXQ6P+6V"}
        })
    }

    fn osm_result() -> Value {
        json!({
            "osm_id": 123456,
            "place_id": 987,
            "lat": "9.0054",
            "lon": "38.7636",
            "name": "",
            "display_name": "Meskel Square, Kirkos, Addis Ababa, Ethiopia"
        })
    }

    #[test]
    fn test_bounding_box_formats() {
        let b = BoundingBox::ADDIS_ABABA;
        assert_eq!(b.google_bounds(), "8.7825,38.5951|9.232,38.976");
        assert_eq!(b.google_rectangle(), "rectangle:8.7825,38.5951|9.232,38.976");
        assert_eq!(b.nominatim_viewbox(), "38.5951,8.7825,38.976,9.232");
    }

    #[test]
    fn test_google_status_mapping() {
        let ok = json!({"status": "OK", "results": [google_result()]});
        assert_eq!(parse_google_results(&ok).unwrap().len(), 1);

        let zero = json!({"status": "ZERO_RESULTS", "results": []});
        assert!(parse_google_results(&zero).unwrap().is_empty());

        let quota = json!({"status": "OVER_QUERY_LIMIT", "results": []});
        assert!(matches!(parse_google_results(&quota), Err(GeocodeError::Quota(_))));

        let denied = json!({"status": "REQUEST_DENIED", "error_message": "bad key"});
        match parse_google_results(&denied) {
            Err(GeocodeError::Rejected { status, message }) => {
                assert_eq!(status, "REQUEST_DENIED");
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_autocomplete_suggestion() {
        let body = json!({
            "status": "OK",
            "predictions": [
                {
                    "description": "Bole Bulbula, Addis Ababa, Ethiopia",
                    "place_id": "ChIJxyz",
                    "structured_formatting": {"main_text": "Bole Bulbula"}
                },
                {"description": "Bole, Addis Ababa, Ethiopia"}
            ]
        });
        let s = parse_suggestion(&body, SuggestMode::Autocomplete).unwrap().unwrap();
        assert_eq!(s.suggested_address, "Bole Bulbula, Addis Ababa, Ethiopia");
        assert_eq!(s.place_id.as_deref(), Some("ChIJxyz"));
        assert_eq!(s.name.as_deref(), Some("Bole Bulbula"));
        assert!(s.geometry.is_none());
        assert!(s.plus_code.is_none());
    }

    #[test]
    fn test_parse_find_place_suggestion() {
        let body = json!({
            "status": "OK",
            "candidates": [{
                "formatted_address": "Gerji, Addis Ababa, Ethiopia",
                "name": "Gerji",
                "geometry": {"location": {"lat": 9.0, "lng": 38.8}},
                "plus_code": {"global_code": "6GXR2Q00+00"}
            }]
        });
        let s = parse_suggestion(&body, SuggestMode::Search).unwrap().unwrap();
        assert_eq!(s.name.as_deref(), Some("Gerji"));
        assert_eq!(s.plus_code.as_deref(), Some("6GXR2Q00+00"));
        let geo = s.geometry.unwrap();
        assert!((geo.lat - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_suggestion_empty() {
        let none = json!({"status": "ZERO_RESULTS", "candidates": []});
        assert!(parse_suggestion(&none, SuggestMode::Search).unwrap().is_none());
        let blank = json!({"predictions": [{"description": "  "}]});
        assert!(parse_suggestion(&blank, SuggestMode::Autocomplete).unwrap().is_none());
    }

    #[test]
    fn test_parse_nominatim() {
        let results = parse_nominatim_results(json!([osm_result()])).unwrap();
        assert_eq!(results.len(), 1);
        assert!(parse_nominatim_results(json!([])).unwrap().is_empty());
        assert!(parse_nominatim_results(json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_classify_status() {
        let e = classify_status(400, "User location is not supported for the API use.".into());
        assert!(e.needs_reconnect());
        let e = classify_status(503, "busy".into());
        assert!(e.is_retryable());
        assert!(!classify_status(400, "bad request".into()).needs_reconnect());
    }

    #[test]
    fn test_provider_place_google() {
        let place = ProviderPlace::from_value(&google_result()).unwrap();
        assert_eq!(place.provider(), ProviderKind::GoogleMaps);
        assert_eq!(place.name(), "Bole Bulbula, Addis Ababa, Ethiopia");
        assert_eq!(place.place_id().as_deref(), Some("ChIJabc"));
        assert_eq!(place.plus_code().as_deref(), Some("6GXQXQ6P+6V"));
        assert!((place.coordinates().unwrap().lng - 38.7872).abs() < 1e-9);
    }

    #[test]
    fn test_provider_place_osm() {
        let place = ProviderPlace::from_value(&osm_result()).unwrap();
        assert_eq!(place.provider(), ProviderKind::Nominatim);
        // Empty name falls back to the display name.
        assert_eq!(place.name(), "Meskel Square, Kirkos, Addis Ababa, Ethiopia");
        assert_eq!(place.place_id().as_deref(), Some("987"));
        assert!(place.plus_code().is_none());
        let c = place.coordinates().unwrap();
        assert!((c.lat - 9.0054).abs() < 1e-9);
    }

    #[test]
    fn test_provider_place_unknown() {
        assert!(ProviderPlace::from_value(&json!({"lat": 1})).is_err());
    }

    #[test]
    fn test_config_defaults_from_partial_toml() {
        let config: ProviderConfig = toml::from_str(r#"contact_email = "ops@example.com""#).unwrap();
        assert_eq!(config.contact_email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.country, "ET");
        assert_eq!(config.timeout_secs, 20);
        assert_eq!(config.bounds, BoundingBox::ADDIS_ABABA);
    }
}
