//! Geocoding subsystem for Addis Ababa addresses.
//!
//! Provides the Google Maps and Nominatim clients, a persistent response
//! cache, request pacing and the resolver that drives the fallback chain.

pub mod cache;
pub mod pacing;
pub mod providers;
pub mod resolver;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheKey, CacheStats, CachedResponse, ResultCache};
pub use pacing::{CancelToken, CommandReconnect, NetworkPath, NoReconnect, RateLimits, RetryPolicy};
pub use providers::{BoundingBox, GeocodingApi, HttpGeocodingApi, ProviderConfig, ProviderPlace};
pub use resolver::{KeyPair, Resolver, ResolverOptions, Route};
pub use types::{
    AddressQuery, Coordinates, GeocodeError, GeocodeResult, Outcome, ProviderCall, ProviderKind,
    ResolutionRecord, Stage, SuggestMode, Suggestion,
};
