//! Address resolution for noisy Amharic/English property addresses in
//! Addis Ababa.
//!
//! Addresses are normalized, sent to Google Maps or Nominatim, and relaxed
//! word by word until a provider recognises them. The batch runner drives
//! whole CSV files through the resolver with checkpointing and resume.

pub mod address;
pub mod batch;
pub mod config;
pub mod error;
pub mod flatten;
pub mod geocode;
