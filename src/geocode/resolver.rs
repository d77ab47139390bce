//! Address resolver: orchestrates the fallback chain for one address query.
//!
//! Per address:  Validate → Direct → Relax (right, left, center) → Success | Empty | Invalid
//! Per query:    main address, then the alternative if the main one found nothing.
//! Per call:     cache → cancel check → rate limiter → provider → retry/backoff → cache

use super::cache::{CacheKey, CachedResponse, ResultCache};
use super::pacing::{self, CancelToken, NetworkPath, NoReconnect, RateLimiter, RateLimits, RetryPolicy};
use super::providers::GeocodingApi;
use super::types::{
    AddressQuery, GeocodeError, GeocodeResult, ProviderCall, ProviderKind, ResolutionRecord, Stage,
    SuggestMode, Suggestion,
};
use crate::address::{is_numeric_only, standardize, trim_words, word_count, AddressNormalizer, Side};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// How addresses are routed to providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Long addresses try Nominatim first, then the Google strategy.
    #[default]
    Auto,
    /// Nominatim only, with relaxation. Needs no API keys.
    NominatimOnly,
}

/// Tunables of the resolution state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Shortest candidate worth sending during relaxation.
    pub min_relax_words: usize,
    /// Addresses with more words than this try Nominatim first.
    pub nominatim_first_words: usize,
    /// Pause between relaxation sides.
    pub side_delay_ms: u64,
    pub nominatim_limit: usize,
    /// Try the alternative address even when the main one is invalid.
    pub alt_after_invalid_main: bool,
    pub route: Route,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            min_relax_words: 2,
            nominatim_first_words: 5,
            side_delay_ms: 100,
            nominatim_limit: 5,
            alt_after_invalid_main: false,
            route: Route::Auto,
        }
    }
}

/// API keys for one item: one for suggestions, one for geocoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPair {
    pub suggest: String,
    pub geocode: String,
}

impl KeyPair {
    pub fn new(suggest: impl Into<String>, geocode: impl Into<String>) -> Self {
        Self { suggest: suggest.into(), geocode: geocode.into() }
    }
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Google(SuggestMode),
    Nominatim,
}

impl Strategy {
    fn provider(&self) -> ProviderKind {
        match self {
            Self::Google(_) => ProviderKind::GoogleMaps,
            Self::Nominatim => ProviderKind::Nominatim,
        }
    }

    fn source(&self) -> String {
        match self {
            Self::Google(mode) => format!("gmaps_robust[{}]", mode),
            Self::Nominatim => "nominatim".to_string(),
        }
    }
}

struct Hit {
    results: Vec<Value>,
    suggestion: Option<Suggestion>,
}

/// The resolver with its provider, cache and pacing.
pub struct Resolver<A: GeocodingApi> {
    api: A,
    normalizer: &'static AddressNormalizer,
    cache: ResultCache,
    limiter: RateLimiter,
    retry: RetryPolicy,
    network: Box<dyn NetworkPath>,
    cancel: CancelToken,
    options: ResolverOptions,
    /// Provider lookups (cached or live) made so far.
    lookups: u64,
}

impl<A: GeocodingApi> Resolver<A> {
    pub fn new(api: A, cache: ResultCache) -> Self {
        Self {
            api,
            normalizer: AddressNormalizer::builtin(),
            cache,
            limiter: RateLimiter::new(RateLimits::default()),
            retry: RetryPolicy::default(),
            network: Box::new(NoReconnect),
            cancel: CancelToken::new(),
            options: ResolverOptions::default(),
            lookups: 0,
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limits(mut self, limits: RateLimits) -> Self {
        self.limiter = RateLimiter::new(limits);
        self
    }

    pub fn with_network(mut self, network: Box<dyn NetworkPath>) -> Self {
        self.network = network;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResultCache {
        &mut self.cache
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Resolve one query into a record.
    ///
    /// Provider failures that survive retries end the query as an empty
    /// record. A query that never reached a provider is invalid. Only
    /// cancellation is returned as an error.
    pub fn resolve(&mut self, query: &AddressQuery, keys: &KeyPair) -> Result<ResolutionRecord, GeocodeError> {
        if !self.normalizer.validate(&query.main) && !self.options.alt_after_invalid_main {
            error!(
                "Invalid address '{}', alt address '{}' not used",
                query.main, query.alternative
            );
            return Ok(ResolutionRecord::invalid(query));
        }

        let mut addresses: Vec<&str> = Vec::with_capacity(2);
        for address in [query.main.as_str(), query.alternative.as_str()] {
            if !address.trim().is_empty() && !addresses.contains(&address) {
                addresses.push(address);
            }
        }

        let lookups_before = self.lookups;
        for address in addresses {
            if !self.normalizer.validate(address) {
                if self.options.alt_after_invalid_main {
                    debug!("Skipping invalid address '{}'", address);
                    continue;
                }
                break;
            }

            match self.resolve_address(address, query.mode, keys) {
                Ok(Some(result)) => return Ok(ResolutionRecord::success(query, result)),
                Ok(None) => {}
                Err(GeocodeError::Cancelled) => return Err(GeocodeError::Cancelled),
                Err(e) => {
                    error!("Provider error for '{}' / '{}': {}", query.main, query.alternative, e);
                    return Ok(ResolutionRecord::empty(query));
                }
            }
        }

        if self.lookups == lookups_before {
            warn!(
                "Nothing left to look up for '{}' / '{}'",
                query.main, query.alternative
            );
            return Ok(ResolutionRecord::invalid(query));
        }
        warn!(
            "Geocoding failed for '{}' and '{}'",
            query.main, query.alternative
        );
        Ok(ResolutionRecord::empty(query))
    }

    /// Resolve a single address string along the configured route.
    pub fn resolve_address(
        &mut self,
        address: &str,
        mode: SuggestMode,
        keys: &KeyPair,
    ) -> Result<Option<GeocodeResult>, GeocodeError> {
        let normalized = self.normalizer.tidy(address);
        debug!("Normalized '{}' -> '{}'", address, normalized);
        let length = word_count(&standardize(address));

        match self.options.route {
            Route::NominatimOnly => self.robust(&normalized, Strategy::Nominatim, keys),
            Route::Auto => {
                // Short vernacular addresses are unreliable on OSM; long ones are specific enough.
                if length > self.options.nominatim_first_words {
                    if let Some(hit) = self.attempt(&normalized, Strategy::Nominatim, keys)? {
                        info!("Nominatim matched '{}' directly", normalized);
                        return Ok(Some(self.finish(Strategy::Nominatim, hit, &normalized, Stage::Direct, None)));
                    }
                }
                self.robust(&normalized, Strategy::Google(mode), keys)
            }
        }
    }

    /// Direct attempt, then progressive relaxation.
    fn robust(
        &mut self,
        normalized: &str,
        strategy: Strategy,
        keys: &KeyPair,
    ) -> Result<Option<GeocodeResult>, GeocodeError> {
        if is_numeric_only(normalized) {
            warn!("Only digit address found: '{}'", normalized);
            return Ok(None);
        }

        if let Some(hit) = self.attempt(normalized, strategy, keys)? {
            return Ok(Some(self.finish(strategy, hit, normalized, Stage::Direct, None)));
        }

        let min_words = self.options.min_relax_words;
        if word_count(normalized) < min_words {
            debug!("'{}' is too short to trim", normalized);
            return Ok(None);
        }

        for (i, side) in Side::ALL.into_iter().enumerate() {
            if i > 0 {
                pacing::sleep(Duration::from_millis(self.options.side_delay_ms), &self.cancel)?;
            }
            let choices = trim_words(normalized, side);
            debug!("Trimming from the {} side: {:?}", side, choices);

            for choice in choices {
                let choice = self.normalizer.tidy(&choice);
                if !self.normalizer.validate(&choice)
                    || word_count(&choice) < min_words
                    || is_numeric_only(&choice)
                {
                    continue;
                }
                if let Some(hit) = self.attempt(&choice, strategy, keys)? {
                    info!("{}-trimming '{}' matched '{}'", side, normalized, choice);
                    return Ok(Some(self.finish(strategy, hit, &choice, Stage::Relax, Some(side))));
                }
            }
        }

        warn!("All {} attempts failed for '{}'", strategy.provider(), normalized);
        Ok(None)
    }

    /// One strategy on one candidate. Numeric-only candidates never reach a provider.
    fn attempt(&mut self, text: &str, strategy: Strategy, keys: &KeyPair) -> Result<Option<Hit>, GeocodeError> {
        if is_numeric_only(text) {
            return Ok(None);
        }
        self.lookups += 1;

        match strategy {
            Strategy::Nominatim => {
                let results = self.search_nominatim(text)?;
                Ok((!results.is_empty()).then_some(Hit { results, suggestion: None }))
            }
            Strategy::Google(mode) => {
                let suggestion = match self.suggest_google(&keys.suggest, text, mode)? {
                    Some(s) => s,
                    None => return Ok(None),
                };
                info!(
                    "Suggestion found via the gmaps {} api: '{}' -> '{}'",
                    mode, text, suggestion.suggested_address
                );
                let results = self.geocode_google(&keys.geocode, &suggestion.suggested_address)?;
                Ok((!results.is_empty()).then_some(Hit { results, suggestion: Some(suggestion) }))
            }
        }
    }

    fn finish(
        &self,
        strategy: Strategy,
        hit: Hit,
        candidate: &str,
        stage: Stage,
        trim_side: Option<Side>,
    ) -> GeocodeResult {
        GeocodeResult {
            provider: strategy.provider(),
            source: strategy.source(),
            raw_results: hit.results,
            suggestion: hit.suggestion,
            matched_candidate: candidate.to_string(),
            stage,
            trim_side,
        }
    }

    // ─── Cached provider calls ──────────────────────────────────

    fn search_nominatim(&mut self, query: &str) -> Result<Vec<Value>, GeocodeError> {
        let key = CacheKey::new(ProviderCall::Nominatim, query);
        if let Some(CachedResponse::Results(results)) = self.cache.get(&key) {
            return Ok(results);
        }
        let limit = self.options.nominatim_limit;
        let results = self.call_with_retry(ProviderCall::Nominatim, query, |api| api.search_nominatim(query, limit))?;
        self.cache.put(&key, CachedResponse::Results(results.clone()));
        Ok(results)
    }

    fn geocode_google(&mut self, api_key: &str, query: &str) -> Result<Vec<Value>, GeocodeError> {
        let key = CacheKey::new(ProviderCall::GoogleGeocode, query);
        if let Some(CachedResponse::Results(results)) = self.cache.get(&key) {
            return Ok(results);
        }
        let results = self.call_with_retry(ProviderCall::GoogleGeocode, query, |api| api.geocode_google(api_key, query))?;
        self.cache.put(&key, CachedResponse::Results(results.clone()));
        Ok(results)
    }

    fn suggest_google(
        &mut self,
        api_key: &str,
        query: &str,
        mode: SuggestMode,
    ) -> Result<Option<Suggestion>, GeocodeError> {
        let key = CacheKey::new(mode.call(), query);
        if let Some(CachedResponse::Suggestion(suggestion)) = self.cache.get(&key) {
            return Ok(suggestion);
        }
        let suggestion = self.call_with_retry(mode.call(), query, |api| api.suggest_google(api_key, query, mode))?;
        self.cache.put(&key, CachedResponse::Suggestion(suggestion.clone()));
        Ok(suggestion)
    }

    /// Run one provider call with pacing, backoff and one reconnect.
    fn call_with_retry<T>(
        &mut self,
        call: ProviderCall,
        query: &str,
        mut request: impl FnMut(&A) -> Result<T, GeocodeError>,
    ) -> Result<T, GeocodeError> {
        let mut attempt = 0;
        let mut reconnected = false;

        loop {
            self.cancel.check()?;
            self.limiter.acquire(call.kind(), &self.cancel)?;

            let err = match request(&self.api) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if err.needs_reconnect() && !reconnected {
                reconnected = true;
                warn!("{} rejected our location for '{}': {}", call, query, err);
                if self.network.reconnect() {
                    continue;
                }
                return Err(err);
            }

            if err.is_retryable() && attempt < self.retry.max_retries {
                let delay = self.retry.delay_for(attempt);
                attempt += 1;
                warn!(
                    "{} failed for '{}' ({}), retry {}/{} in {:?}",
                    call, query, err, attempt, self.retry.max_retries, delay
                );
                pacing::sleep(delay, &self.cancel)?;
                continue;
            }

            error!("{} failed for '{}': {}", call, query, err);
            return Err(err);
        }
    }
}
