//! In-memory provider used by unit tests.

use super::pacing::NetworkPath;
use super::providers::GeocodingApi;
use super::types::{GeocodeError, ProviderCall, SuggestMode, Suggestion};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCall {
    pub call: ProviderCall,
    pub key: Option<String>,
    pub query: String,
}

/// Succeeds only for queries in its accept list; records every call.
pub struct StubApi {
    accept: Vec<String>,
    failures: RefCell<VecDeque<GeocodeError>>,
    calls: RefCell<Vec<StubCall>>,
}

impl StubApi {
    pub fn accepting(accept: &[&str]) -> Self {
        Self {
            accept: accept.iter().map(|s| s.to_string()).collect(),
            failures: RefCell::new(VecDeque::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// The next calls fail with these errors, in order.
    pub fn failing_first(self, errors: Vec<GeocodeError>) -> Self {
        self.failures.borrow_mut().extend(errors);
        self
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.borrow().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.query.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn record(&self, call: ProviderCall, key: Option<&str>, query: &str) -> Result<bool, GeocodeError> {
        self.calls.borrow_mut().push(StubCall {
            call,
            key: key.map(String::from),
            query: query.to_string(),
        });
        match self.failures.borrow_mut().pop_front() {
            Some(e) => Err(e),
            None => Ok(self.accept.iter().any(|a| a == query)),
        }
    }
}

impl GeocodingApi for StubApi {
    fn geocode_google(&self, key: &str, address: &str) -> Result<Vec<Value>, GeocodeError> {
        let hit = self.record(ProviderCall::GoogleGeocode, Some(key), address)?;
        Ok(if hit {
            vec![json!({
                "address_components": [],
                "formatted_address": address,
                "place_id": format!("gp-{}", address),
                "geometry": {"location": {"lat": 9.0, "lng": 38.75}}
            })]
        } else {
            vec![]
        })
    }

    fn suggest_google(
        &self,
        key: &str,
        address: &str,
        mode: SuggestMode,
    ) -> Result<Option<Suggestion>, GeocodeError> {
        let hit = self.record(mode.call(), Some(key), address)?;
        Ok(hit.then(|| Suggestion::new(address)))
    }

    fn search_nominatim(&self, address: &str, _limit: usize) -> Result<Vec<Value>, GeocodeError> {
        let hit = self.record(ProviderCall::Nominatim, None, address)?;
        Ok(if hit {
            vec![json!({
                "osm_id": 42,
                "place_id": 7,
                "lat": "9.01",
                "lon": "38.76",
                "display_name": address
            })]
        } else {
            vec![]
        })
    }
}

/// Counts reconnect requests.
pub struct CountingReconnect(pub Rc<Cell<u32>>);

impl NetworkPath for CountingReconnect {
    fn reconnect(&mut self) -> bool {
        self.0.set(self.0.get() + 1);
        true
    }
}
