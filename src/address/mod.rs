//! Address canonicalization and relaxation.
//!
//! Pure text processing: no I/O, no provider knowledge.

pub mod normalizer;
pub mod relax;
pub mod rules;

pub use normalizer::{is_numeric_only, standardize, word_count, AddressNormalizer};
pub use relax::{candidates, trim_words, Candidate, Side};
pub use rules::RuleEngine;
