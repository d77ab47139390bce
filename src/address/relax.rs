//! Query relaxation: progressively shorter candidates for an unmatched address.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which end(s) of the address a candidate was trimmed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Right,
    Left,
    Center,
}

impl Side {
    /// Sides in the order they are tried.
    pub const ALL: [Side; 3] = [Side::Right, Side::Left, Side::Center];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Right => write!(f, "right"),
            Self::Left => write!(f, "left"),
            Self::Center => write!(f, "center"),
        }
    }
}

/// A trimmed query together with how it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub text: String,
    pub side: Side,
    /// Number of words dropped from each trimmed end.
    pub iteration: usize,
}

/// Trim words from one side, least aggressive first.
///
/// Fewer than three words leaves nothing worth trimming, so the words are
/// returned as they are. Center trimming stops at half the word count; for
/// an even count its last candidate is empty.
pub fn trim_words(text: &str, side: Side) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let n = words.len();
    if n < 3 {
        return words.into_iter().map(String::from).collect();
    }

    (1..n)
        .filter_map(|i| {
            let kept = match side {
                Side::Right => &words[..n - i],
                Side::Left => &words[i..],
                Side::Center if i <= n / 2 => &words[i..n - i],
                Side::Center => return None,
            };
            Some(kept.join(" "))
        })
        .collect()
}

/// All candidates for `text`: right trims, then left, then center.
pub fn candidates(text: &str) -> Vec<Candidate> {
    Side::ALL
        .iter()
        .flat_map(|&side| {
            trim_words(text, side)
                .into_iter()
                .enumerate()
                .map(move |(i, text)| Candidate { text, side, iteration: i + 1 })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(trim_words("a b", Side::Right), vec!["a", "b"]);
        assert_eq!(trim_words("a", Side::Left), vec!["a"]);
        assert!(trim_words("", Side::Center).is_empty());
    }

    #[test]
    fn test_three_words() {
        assert_eq!(trim_words("a b c", Side::Right), vec!["a b", "a"]);
        assert_eq!(trim_words("a b c", Side::Left), vec!["b c", "c"]);
        assert_eq!(trim_words("a b c", Side::Center), vec!["b"]);
    }

    #[test]
    fn test_right_and_left_drop_one_more_each_step() {
        let right = trim_words("a b c d e", Side::Right);
        assert_eq!(right, vec!["a b c d", "a b c", "a b", "a"]);
        let left = trim_words("a b c d e", Side::Left);
        assert_eq!(left, vec!["b c d e", "c d e", "d e", "e"]);
    }

    #[test]
    fn test_center_is_symmetric() {
        assert_eq!(trim_words("a b c d e", Side::Center), vec!["b c d", "c"]);
        assert_eq!(trim_words("a b c d", Side::Center), vec!["b c", ""]);
        assert_eq!(trim_words("a b c d e f", Side::Center), vec!["b c d e", "c d", ""]);
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(trim_words("  a   b  c ", Side::Right), vec!["a b", "a"]);
    }

    #[test]
    fn test_candidates_order() {
        let all = candidates("a b c");
        let texts: Vec<&str> = all.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b", "a", "b c", "c", "b"]);
        assert_eq!(all[0].side, Side::Right);
        assert_eq!(all[1].iteration, 2);
        assert_eq!(all[2].side, Side::Left);
        assert_eq!(all[4], Candidate { text: "b".into(), side: Side::Center, iteration: 1 });
    }

    #[test]
    fn test_side_serde() {
        assert_eq!(serde_json::to_string(&Side::Center).unwrap(), "\"center\"");
        let side: Side = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(side, Side::Left);
        assert_eq!(Side::Right.to_string(), "right");
    }
}
