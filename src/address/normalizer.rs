//! Address canonicalization: standardize, validate, tidy.

use super::rules::RuleEngine;
use once_cell::sync::Lazy;
use regex::Regex;

/// Default cap on tidying rounds.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s\p{N}]").expect("static regex must compile"));

/// Values that upstream tooling writes for a missing address.
const MISSING_MARKERS: &[&str] = &["NA", "NAN", "NONE", "NULL"];

/// Lowercase, turn every non-word character into a space, collapse whitespace.
pub fn standardize(text: &str) -> String {
    let lowered = text.to_lowercase();
    squish(&NON_WORD.replace_all(&lowered, " "))
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn squish(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_numeric)
}

/// True for empty text or text whose every token is a number. Such text is
/// too ambiguous to send to a provider.
pub fn is_numeric_only(text: &str) -> bool {
    text.split_whitespace().all(is_number)
}

/// Rule-driven normalizer for bilingual addresses.
pub struct AddressNormalizer {
    rules: &'static RuleEngine,
    max_iterations: usize,
}

impl Default for AddressNormalizer {
    fn default() -> Self {
        Self::new(RuleEngine::builtin())
    }
}

impl AddressNormalizer {
    pub fn new(rules: &'static RuleEngine) -> Self {
        Self { rules, max_iterations: DEFAULT_MAX_ITERATIONS }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// The shared normalizer over the built-in rule table.
    pub fn builtin() -> &'static AddressNormalizer {
        static NORMALIZER: Lazy<AddressNormalizer> = Lazy::new(AddressNormalizer::default);
        &NORMALIZER
    }

    /// Strict validation: see [`AddressNormalizer::validate_with`].
    pub fn validate(&self, address: &str) -> bool {
        self.validate_with(address, true)
    }

    /// Reject empty text, missing-value markers and bare numbers. In strict
    /// mode also reject text that is nothing but boilerplate. Known numeric
    /// sites are always accepted.
    pub fn validate_with(&self, address: &str, strict: bool) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }
        if self.rules.is_numeric_site(address) {
            return true;
        }

        let upper = address.to_uppercase();
        let is_proper = !is_number(address) && !MISSING_MARKERS.contains(&upper.as_str());
        if !strict || !is_proper {
            return is_proper;
        }
        !self.rules.is_boilerplate(address)
    }

    /// Tidy with the configured iteration cap.
    pub fn tidy(&self, address: &str) -> String {
        self.tidy_with(address, self.max_iterations)
    }

    /// Repeatedly strip boilerplate until the text stabilizes, an exception
    /// applies, the text is a known numeric site, or the cap is reached.
    pub fn tidy_with(&self, address: &str, max_iterations: usize) -> String {
        let mut text = standardize(address);

        for _ in 0..max_iterations {
            if self.rules.is_numeric_site(&text) || self.rules.is_protected(&text) {
                break;
            }

            let mut stripped = squish(&self.rules.strip(&text));
            // A lone number left behind is not an address unless it is a known site.
            if is_number(&stripped) && !self.rules.is_numeric_site(&stripped) {
                stripped.clear();
            }

            if stripped == text {
                break;
            }
            text = stripped;
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n() -> &'static AddressNormalizer {
        AddressNormalizer::builtin()
    }

    #[test]
    fn test_standardize() {
        assert_eq!(standardize("  Bole,  Atlas-Area!! "), "bole atlas area");
        assert_eq!(standardize("ቦሌ፣ ቡልቡላ።"), "ቦሌ ቡልቡላ");
        assert_eq!(standardize("CMC_Road"), "cmc_road");
        assert_eq!(standardize(""), "");
    }

    #[test]
    fn test_validate_rejects() {
        assert!(!n().validate(""));
        assert!(!n().validate("   "));
        assert!(!n().validate("NA"));
        assert!(!n().validate("nan"));
        assert!(!n().validate("123"));
        assert!(!n().validate("Addis Ababa"));
        assert!(!n().validate("ኢትዮጵያ"));
        assert!(!n().validate("Sefer"));
        assert!(!n().validate("condominium"));
        assert!(!n().validate("Woreda 03"));
    }

    #[test]
    fn test_validate_missing_value() {
        let missing: Option<&str> = None;
        assert!(!missing.map_or(false, |a| n().validate(a)));
    }

    #[test]
    fn test_validate_accepts() {
        assert!(n().validate("22"));
        assert!(n().validate("140"));
        assert!(n().validate("Bole Bulbula"));
        assert!(n().validate("bole sefer"));
        assert!(n().validate("ሰፈር አያት የለማ መንደር"));
    }

    #[test]
    fn test_validate_lenient_allows_boilerplate() {
        assert!(n().validate_with("addis ababa", false));
        assert!(!n().validate_with("123", false));
        assert!(!n().validate_with("NA", false));
    }

    #[test]
    fn test_tidy_strips_locality_terms() {
        let out = n().tidy("ሰፈር አያት የለማ መንደር");
        assert_eq!(out, "አያት የለማ");
        assert!(!out.split_whitespace().any(|w| w == "ሰፈር" || w == "መንደር"));
    }

    #[test]
    fn test_tidy_strips_area_and_qualifiers() {
        assert_eq!(n().tidy("ቦሌ ቡልቡላ አካባቢ ጥሩ ቤት"), "ቦሌ ቡልቡላ");
        assert_eq!(n().tidy("Nice house, Gerji Mebrat Hail area"), "gerji mebrat hail");
    }

    #[test]
    fn test_tidy_strips_admin_boilerplate() {
        assert_eq!(n().tidy("Bole Sub City, Woreda 03, Addis Ababa, Ethiopia"), "bole");
        assert_eq!(n().tidy("ቦሌ ክፍለ ከተማ ወረዳ 3"), "ቦሌ");
    }

    #[test]
    fn test_tidy_keeps_exceptions() {
        assert_eq!(n().tidy("Ayat Condominium"), "ayat condominium");
        assert_eq!(n().tidy("Wello Sefer"), "wello sefer");
        assert_eq!(n().tidy("ፈረስ ቤት"), "ፈረስ ቤት");
        assert_eq!(n().tidy("22 area"), "22 area");
    }

    #[test]
    fn test_tidy_numeric_leftovers() {
        assert_eq!(n().tidy("22"), "22");
        assert_eq!(n().tidy("kebele 03 4"), "");
        assert_eq!(n().tidy("woreda 05 17"), "");
        assert_eq!(n().tidy("woreda 05 24"), "24");
        assert_eq!(n().tidy("villa 17"), "");
        // A site number next to a property word is a place name.
        assert_eq!(n().tidy("house 140 villa"), "house 140 villa");
    }

    #[test]
    fn test_tidy_isolated_characters() {
        assert_eq!(n().tidy("gerji - x mebrat"), "gerji mebrat");
        assert_eq!(n().tidy("block b"), "block b");
    }

    #[test]
    fn test_tidy_idempotent() {
        let samples = [
            "ቦሌ ቡልቡላ አካባቢ ጥሩ ቤት",
            "ሰፈር አያት የለማ መንደር",
            "Bole Sub City, Woreda 03, Addis Ababa",
            "Ayat Condominium",
            "22 Mazoria Sefer",
            "CMC Michael Area Villa House",
            "Summit Fiyel Bet",
            "kebele 03 4",
            "a b c d",
            "Lebu Varnero Apartments",
            "Megenagna, near Zefmesh mall",
            "",
        ];
        for s in samples {
            let once = n().tidy(s);
            assert_eq!(n().tidy(&once), once, "tidy not idempotent for '{}'", s);
        }
    }

    #[test]
    fn test_tidy_iteration_cap() {
        let zero = AddressNormalizer::default().with_max_iterations(0);
        assert_eq!(zero.tidy("Bole Area"), "bole area");
    }

    #[test]
    fn test_numeric_only() {
        assert!(is_numeric_only(""));
        assert!(is_numeric_only("17 18"));
        assert!(is_numeric_only("22"));
        assert!(!is_numeric_only("bole 22"));
    }
}
