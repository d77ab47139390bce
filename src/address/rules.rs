//! Declarative boilerplate rules for Addis Ababa addresses.
//!
//! Every term list is plain data: adding a new administrative term or local
//! idiom means adding a string here, not touching the normalizer. The
//! [`RuleEngine`] compiles the ordered rule list into three matchers:
//! strip (removed during tidying), protect (exceptions that stop tidying)
//! and boilerplate (texts that carry no geocodable information on their own).

use once_cell::sync::Lazy;
use regex::Regex;

// ─── Term data ──────────────────────────────────────────────────

/// Known site numbers that are valid addresses on their own ("22", "24", ...).
pub const NUMERIC_SITES: &[&str] = &[
    "22", "24", "7", "18", "49", "71", "72", "41", "3", "140", "30",
];

/// How a term list is wrapped into a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermShape {
    /// Optional numbers on both sides, word-bounded (`woreda 03`, `ethiopia`).
    Bounded,
    /// English: optional leading number, word-bounded.
    /// Amharic: optional trailing number, no boundary (suffixes attach).
    Suffixed,
    /// A bare word.
    Word,
}

/// Category of a rule, used for logging and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternClass {
    AdminArea,
    AdminTerm,
    Locality,
    Property,
    Qualifier,
    Isolated,
    NumberedPrefix,
    NumericSiteCompound,
    SeferAddress,
    BetAddress,
    CondoAddress,
}

/// A list of interchangeable terms in both scripts.
///
/// Entries are regex fragments; a literal space means "optional whitespace".
pub struct TermList {
    pub class: PatternClass,
    pub shape: TermShape,
    pub english: &'static [&'static str],
    pub amharic: &'static [&'static str],
}

pub const ADMIN_AREAS: TermList = TermList {
    class: PatternClass::AdminArea,
    shape: TermShape::Bounded,
    english: &["ethiopia", "addis ababa", "adama", "naz[ie]?ret", "oromia", "finfinn?ee?"],
    amharic: &["ኢትዮጵያ", "አዲስ አበባ", "አዳማ", "ናዝሬት", "ኦሮሚያ", "ፊንፊኔ"],
};

pub const ADMIN_TERMS: TermList = TermList {
    class: PatternClass::AdminTerm,
    shape: TermShape::Bounded,
    english: &["sub city", "woreda", "wereda", "kebele"],
    amharic: &["ክፍለ ከተማ", "ወረዳ", "ቀበሌ"],
};

pub const LOCALITY_TERMS: TermList = TermList {
    class: PatternClass::Locality,
    shape: TermShape::Suffixed,
    english: &["area", "bota", "akababi", "sefer", "men[ei]?der", "site", "adebabay"],
    amharic: &["አካባቢ", "ቦታ", "ሰፈር", "መንደር", "ሳይት", "አደባባይ"],
};

pub const PROPERTY_TERMS: TermList = TermList {
    class: PatternClass::Property,
    shape: TermShape::Suffixed,
    english: &["condominiums?", "apartments?", "house", "villa", "bet", "ber"],
    amharic: &["ኮንዶሚኒየም", "አፓርታማ", "አፓርትመንት", "ቤቶች", "ቤት", "ቪላ", "በር"],
};

/// Marketing adjectives that listing authors glue onto addresses.
pub const QUALIFIERS: TermList = TermList {
    class: PatternClass::Qualifier,
    shape: TermShape::Word,
    english: &["good", "nice", "beautiful", "luxury", "luxurious"],
    amharic: &["ጥሩ", "ቆንጆ", "ምርጥ", "ዘመናዊ"],
};

/// Place names that form a protected "<name> sefer" address.
const SEFER_NAMES: (&[&str], &[&str]) = (
    &["w[eo]ll?o", "addis", "w[oe][yi].?ra", "geja"],
    &["ወይራ", "አዲስ", "ጌጃ", "ወሎ"],
);

/// Place names that form a protected "<name> bet" address.
const BET_NAMES: (&[&str], &[&str]) = (
    &["fere?s", "be[qk][ei]?ll?o", "fiyele?"],
    &["ፈረስ", "በቅሎ", "ፍየል"],
);

/// Condominium sites whose name includes the property term.
const CONDO_SITES: (&[&str], &[&str]) = (
    &[
        "ayat", "semit", "ajamba", "gelan", "gotera", "24", "haya arat", "22",
        "haya hulet", "kill?into", "abado", "mexico", "arabsa", "koye", "jemm?o",
    ],
    &[
        "አያት", "ሰሚት", "አጃምባ", "ገላን", "ጎተራ", "ሀያ አራት", "ሀያ ሁለት", "ቂሊንጦ",
        "አባዶ", "ሜክሲኮ", "አራብሳ", "ኮየ", "ጀሞ",
    ],
);

/// Single characters that survive isolated-character removal.
const PROTECTED_SHORT_TOKENS: &str = "0-9bnቁክህብ";

// ─── Pattern construction ───────────────────────────────────────

fn alternation(terms: &[&str]) -> String {
    terms
        .iter()
        .map(|t| t.replace(' ', r"\s*"))
        .collect::<Vec<_>>()
        .join("|")
}

impl TermList {
    /// The regex fragment matching one occurrence of any term.
    pub fn pattern(&self) -> String {
        match self.shape {
            TermShape::Bounded => {
                let all: Vec<&str> = self.english.iter().chain(self.amharic).copied().collect();
                format!(r"\b\d*\s*(?:{})\s*\d*\b", alternation(&all))
            }
            TermShape::Suffixed => format!(
                r"(?:\b\d*\s*(?:{})\b|(?:{})\s*\d*)",
                alternation(self.english),
                alternation(self.amharic),
            ),
            TermShape::Word => {
                let all: Vec<&str> = self.english.iter().chain(self.amharic).copied().collect();
                format!(r"\b(?:{})\b", alternation(&all))
            }
        }
    }
}

fn numeric_sites_pattern() -> String {
    format!("(?:{})", NUMERIC_SITES.join("|"))
}

fn named_compound(names: (&[&str], &[&str]), english_term: &str, amharic_term: &str) -> String {
    format!(
        r"\b(?:{})\s*{}\b|(?:{})\s*{}",
        alternation(names.0),
        english_term,
        alternation(names.1),
        amharic_term,
    )
}

// ─── Rule table ─────────────────────────────────────────────────

/// What happens when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// The match is replaced by a space.
    Strip,
    /// The whole text is kept verbatim for the current tidying round.
    Protect,
}

/// Where a rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Anywhere in the text.
    Embedded,
    /// Only when it spans the entire text.
    Whole,
    /// The pattern carries its own anchors.
    Anchored,
}

/// One entry of the rule table.
#[derive(Debug, Clone)]
pub struct Rule {
    pub class: PatternClass,
    pub action: RuleAction,
    pub scope: Scope,
    pub pattern: String,
}

impl Rule {
    fn strip(class: PatternClass, scope: Scope, pattern: String) -> Self {
        Self { class, action: RuleAction::Strip, scope, pattern }
    }

    fn protect(class: PatternClass, pattern: String) -> Self {
        Self { class, action: RuleAction::Protect, scope: Scope::Embedded, pattern }
    }

    fn scoped_pattern(&self) -> String {
        match self.scope {
            Scope::Embedded => format!("(?:{})", self.pattern),
            Scope::Whole => format!("^(?:{})$", self.pattern),
            Scope::Anchored => self.pattern.clone(),
        }
    }
}

/// The built-in rule table, in evaluation order.
pub fn default_rules() -> Vec<Rule> {
    let locality = LOCALITY_TERMS.pattern();
    let property = PROPERTY_TERMS.pattern();
    let admin_area = ADMIN_AREAS.pattern();
    let admin_term = ADMIN_TERMS.pattern();
    let sites = numeric_sites_pattern();
    let isolated = format!(
        r"\s+[^{k}]\s+|^[^{k}]\s+|\s+[^{k}]$",
        k = PROTECTED_SHORT_TOKENS
    );

    vec![
        // Embedded boilerplate, removed wherever it appears.
        Rule::strip(PatternClass::Locality, Scope::Embedded, locality.clone()),
        Rule::strip(PatternClass::AdminArea, Scope::Embedded, admin_area.clone()),
        Rule::strip(PatternClass::Property, Scope::Embedded, property.clone()),
        Rule::strip(PatternClass::AdminTerm, Scope::Embedded, admin_term.clone()),
        Rule::strip(PatternClass::Qualifier, Scope::Embedded, QUALIFIERS.pattern()),
        // Broad terms: boilerplate only when nothing else is present.
        Rule::strip(PatternClass::AdminArea, Scope::Whole, admin_area),
        Rule::strip(PatternClass::AdminTerm, Scope::Whole, admin_term),
        Rule::strip(PatternClass::Locality, Scope::Whole, locality.clone()),
        Rule::strip(PatternClass::Property, Scope::Whole, property.clone()),
        // Connector residue and "N ቁጥር N" numbering.
        Rule::strip(PatternClass::Isolated, Scope::Anchored, isolated),
        Rule::strip(
            PatternClass::NumberedPrefix,
            Scope::Anchored,
            r"^\d+\s*(?:ቁጥር|ቁ\.?)\s*\d+".to_string(),
        ),
        // Exceptions that look like boilerplate but name a place.
        Rule::protect(
            PatternClass::NumericSiteCompound,
            format!(
                r"\b{sites}\s*(?:{locality}|{property})|(?:{locality}|{property})\s*{sites}\b"
            ),
        ),
        Rule::protect(
            PatternClass::SeferAddress,
            format!(
                r"(?:{})\s*sefer|(?:{})\s*ሰፈር",
                alternation(SEFER_NAMES.0),
                alternation(SEFER_NAMES.1)
            ),
        ),
        Rule::protect(PatternClass::BetAddress, named_compound(BET_NAMES, "bet", "ቤት")),
        Rule::protect(
            PatternClass::CondoAddress,
            named_compound(CONDO_SITES, "condominiums?", "ኮንዶሚኒየም"),
        ),
    ]
}

// ─── Engine ─────────────────────────────────────────────────────

/// Compiled form of a rule table.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    strip: Regex,
    protect: Regex,
    boilerplate: Regex,
    numeric_site: Regex,
}

fn compile<'a>(parts: impl Iterator<Item = &'a Rule>) -> Result<Regex, regex::Error> {
    let joined = parts.map(Rule::scoped_pattern).collect::<Vec<_>>().join("|");
    // An empty alternation would match everywhere.
    let body = if joined.is_empty() { r"\b\B".to_string() } else { joined };
    Regex::new(&format!("(?i){}", body))
}

impl RuleEngine {
    /// Compile an ordered rule list.
    pub fn new(rules: Vec<Rule>) -> Result<Self, regex::Error> {
        let strip = compile(rules.iter().filter(|r| r.action == RuleAction::Strip))?;
        let protect = compile(rules.iter().filter(|r| r.action == RuleAction::Protect))?;
        let boilerplate = compile(
            rules
                .iter()
                .filter(|r| r.action == RuleAction::Strip && r.scope == Scope::Whole),
        )?;
        let numeric_site = Regex::new(&format!(r"^{}$", numeric_sites_pattern()))?;
        Ok(Self { rules, strip, protect, boilerplate, numeric_site })
    }

    /// The built-in table, compiled once.
    pub fn builtin() -> &'static RuleEngine {
        static ENGINE: Lazy<RuleEngine> = Lazy::new(|| {
            RuleEngine::new(default_rules()).expect("built-in address rules must compile")
        });
        &ENGINE
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Replace every strip match with a single space.
    pub fn strip(&self, text: &str) -> String {
        self.strip.replace_all(text, " ").into_owned()
    }

    /// True when an exception applies: the text contains boilerplate that is
    /// part of a protected place name.
    pub fn is_protected(&self, text: &str) -> bool {
        self.strip.is_match(text) && self.protect.is_match(text)
    }

    /// True when the text is nothing but a broad term (admin area, locality
    /// or property word, optionally numbered).
    pub fn is_boilerplate(&self, text: &str) -> bool {
        self.boilerplate.is_match(text)
    }

    /// True when the text is exactly one of [`NUMERIC_SITES`].
    pub fn is_numeric_site(&self, text: &str) -> bool {
        self.numeric_site.is_match(text)
    }
}
