//! Two-valued outcome shared by every build, check and test leaf.

use serde::{Deserialize, Serialize};

/// Verdict of one leaf step, or of a whole run after [`aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }

    /// Stable textual hint shown in report tables.
    pub fn hint(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILED",
        }
    }

    /// Forge emoji shortcode shown next to the hint.
    pub fn glyph(self) -> &'static str {
        match self {
            Outcome::Success => " :white_check_mark: ",
            Outcome::Failure => ":x:",
        }
    }

    /// Logical AND of two outcomes.
    pub fn and(self, other: Outcome) -> Outcome {
        if self.is_success() && other.is_success() {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }

    /// Parse the loose `success`/`failed` wording used by pipeline scripts.
    /// Anything other than `success` is a failure.
    pub fn from_word(word: &str) -> Self {
        Outcome::from_success(word.trim().eq_ignore_ascii_case("success"))
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hint())
    }
}

/// Fold outcomes with logical AND. An empty collection is a success.
pub fn aggregate<I>(outcomes: I) -> Outcome
where
    I: IntoIterator<Item = Outcome>,
{
    outcomes
        .into_iter()
        .fold(Outcome::Success, |acc, o| acc.and(o))
}
