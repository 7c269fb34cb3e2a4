//! Shared value types for the CrewForge pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (token counts are non-negative integers,
//! usage always states where its numbers came from) and participate in domain
//! computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// Number of tokens consumed in an LLM API call.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// A count of zero.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this count is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for TokenCount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for TokenCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, c| acc + c)
    }
}

// ---------------------------------------------------------------------------

/// Where the numbers inside a [`TokenUsage`] came from.
///
/// Zero is a legitimate count, so the source is what separates a true zero
/// from a degraded or absent measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    /// Counts reported by the LLM backend.
    Reported,
    /// Whitespace word-count heuristic; the backend reported nothing.
    Estimated,
    /// The call failed or was abandoned and no consumption was reported.
    /// Counts are zero.
    Unavailable,
    /// The action short-circuited locally and made no LLM call.
    NotInvoked,
}

/// Input/output token counts attached to every action result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub input_tokens: TokenCount,
    /// Tokens in the completion.
    pub output_tokens: TokenCount,
    /// Provenance of the counts.
    pub source: UsageSource,
}

impl TokenUsage {
    /// Usage reported by the backend.
    pub fn reported(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens: TokenCount::new(input_tokens),
            output_tokens: TokenCount::new(output_tokens),
            source: UsageSource::Reported,
        }
    }

    /// Degraded-accuracy fallback: counts whitespace-separated words of the
    /// prompt and the response.
    pub fn estimated(prompt: &str, response: &str) -> Self {
        Self {
            input_tokens: TokenCount::new(prompt.split_whitespace().count() as u64),
            output_tokens: TokenCount::new(response.split_whitespace().count() as u64),
            source: UsageSource::Estimated,
        }
    }

    /// Zero usage for a failed or abandoned call that reported nothing.
    pub fn unavailable() -> Self {
        Self {
            input_tokens: TokenCount::zero(),
            output_tokens: TokenCount::zero(),
            source: UsageSource::Unavailable,
        }
    }

    /// Zero usage for a local short-circuit.
    pub fn not_invoked() -> Self {
        Self {
            input_tokens: TokenCount::zero(),
            output_tokens: TokenCount::zero(),
            source: UsageSource::NotInvoked,
        }
    }

    /// Sum of input and output tokens.
    pub fn total(&self) -> TokenCount {
        self.input_tokens + self.output_tokens
    }

    /// `true` when the backend claims a call consumed nothing at all.
    ///
    /// Zero-both usage from a real call is suspicious and is tracked by the
    /// ledger rather than rejected.
    pub fn is_suspicious_zero(&self) -> bool {
        self.source == UsageSource::Reported
            && self.input_tokens.is_zero()
            && self.output_tokens.is_zero()
    }

    /// Combines the usage of two attempts of the same call.
    ///
    /// The combined source is the least trustworthy non-zero contributor: any
    /// estimated part makes the whole estimated, and a reported part wins over
    /// an unavailable one.
    pub fn combine(self, other: TokenUsage) -> TokenUsage {
        let source = match (self.source, other.source) {
            (UsageSource::Estimated, _) | (_, UsageSource::Estimated) => UsageSource::Estimated,
            (UsageSource::Reported, _) | (_, UsageSource::Reported) => UsageSource::Reported,
            (UsageSource::Unavailable, _) | (_, UsageSource::Unavailable) => {
                UsageSource::Unavailable
            }
            (UsageSource::NotInvoked, UsageSource::NotInvoked) => UsageSource::NotInvoked,
        };
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimated_usage_counts_words() {
        let usage = TokenUsage::estimated("analyse  this\nprompt", "ok done");
        assert_eq!(usage.input_tokens.as_u64(), 3);
        assert_eq!(usage.output_tokens.as_u64(), 2);
        assert_eq!(usage.source, UsageSource::Estimated);
    }

    #[test]
    fn test_suspicious_zero_only_for_reported_usage() {
        assert!(TokenUsage::reported(0, 0).is_suspicious_zero());
        assert!(!TokenUsage::reported(1, 0).is_suspicious_zero());
        assert!(!TokenUsage::unavailable().is_suspicious_zero());
        assert!(!TokenUsage::not_invoked().is_suspicious_zero());
    }

    #[test]
    fn test_combine_keeps_counts_and_weakest_source() {
        let failed_attempt = TokenUsage::reported(40, 2);
        let retry = TokenUsage::reported(42, 100);
        let combined = failed_attempt.combine(retry);
        assert_eq!(combined.input_tokens.as_u64(), 82);
        assert_eq!(combined.output_tokens.as_u64(), 102);
        assert_eq!(combined.source, UsageSource::Reported);

        let degraded = TokenUsage::unavailable().combine(TokenUsage::estimated("a b", "c"));
        assert_eq!(degraded.source, UsageSource::Estimated);

        let abandoned = TokenUsage::unavailable().combine(TokenUsage::unavailable());
        assert_eq!(abandoned.source, UsageSource::Unavailable);
        assert!(abandoned.total().is_zero());
    }

    #[test]
    fn test_token_count_serialises_as_plain_integer() {
        let json = serde_json::to_string(&TokenCount::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
