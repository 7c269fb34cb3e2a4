//! Team-wide token accounting.
//!
//! [`TokenLedger`] is an explicit value owned by the orchestrator. Every action
//! the team performs appends exactly one [`LedgerEntry`]; the running totals are
//! only ever changed by that append, so at any point
//! `ledger.input_tokens() == sum(entry.input_tokens)` (and likewise for output).

use serde::{Deserialize, Serialize};

use crate::{Timestamp, TokenCount, TokenUsage, UsageSource};

/// One recorded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Action name (e.g. `"AnalyzeRequirements"`).
    pub action: String,
    /// Role that performed the action (e.g. `"ProjectManager"`).
    pub role: String,
    pub input_tokens: TokenCount,
    pub output_tokens: TokenCount,
    pub total_tokens: TokenCount,
    /// Provenance of the counts.
    pub source: UsageSource,
}

/// Running totals plus the ordered per-action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLedger {
    input_tokens: TokenCount,
    output_tokens: TokenCount,
    total_tokens: TokenCount,
    actions: Vec<LedgerEntry>,
    started_at: Timestamp,
}

impl Default for TokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            input_tokens: TokenCount::zero(),
            output_tokens: TokenCount::zero(),
            total_tokens: TokenCount::zero(),
            actions: Vec::new(),
            started_at: Timestamp::now(),
        }
    }

    /// Appends one action's usage and updates the totals.
    pub fn record(&mut self, role: &str, action: &str, usage: &TokenUsage) {
        if usage.is_suspicious_zero() {
            tracing::warn!(role, action, "Backend reported zero input and output tokens");
        }
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.total_tokens += usage.total();
        self.actions.push(LedgerEntry {
            action: action.to_string(),
            role: role.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
            source: usage.source,
        });
    }

    pub fn input_tokens(&self) -> TokenCount {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> TokenCount {
        self.output_tokens
    }

    pub fn total_tokens(&self) -> TokenCount {
        self.total_tokens
    }

    /// The ordered per-action log.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.actions
    }

    /// When the ledger was opened.
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// `true` when the totals equal the sums over the entries.
    pub fn is_reconciled(&self) -> bool {
        let input: TokenCount = self.actions.iter().map(|e| e.input_tokens).sum();
        let output: TokenCount = self.actions.iter().map(|e| e.output_tokens).sum();
        input == self.input_tokens
            && output == self.output_tokens
            && self.total_tokens == input + output
    }

    /// Entries where the backend reported zero tokens for a real call.
    pub fn suspicious_entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.actions.iter().filter(|e| {
            e.source == UsageSource::Reported && e.input_tokens.is_zero() && e.output_tokens.is_zero()
        })
    }

    /// Entries whose counts are not true backend measurements.
    pub fn degraded_entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.actions
            .iter()
            .filter(|e| matches!(e.source, UsageSource::Estimated | UsageSource::Unavailable))
    }

    /// The `n` most token-intensive entries, largest first. Ties keep log order.
    pub fn top_consumers(&self, n: usize) -> Vec<&LedgerEntry> {
        let mut sorted: Vec<&LedgerEntry> = self.actions.iter().collect();
        sorted.sort_by(|a, b| b.total_tokens.cmp(&a.total_tokens));
        sorted.truncate(n);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_record_accumulates_and_logs() {
        let mut ledger = TokenLedger::new();
        ledger.record("ProjectManager", "AnalyzeRequirements", &TokenUsage::reported(10, 5));
        ledger.record("Architect", "ReviewIntegration", &TokenUsage::not_invoked());

        assert_eq!(ledger.input_tokens().as_u64(), 10);
        assert_eq!(ledger.output_tokens().as_u64(), 5);
        assert_eq!(ledger.total_tokens().as_u64(), 15);
        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.entries()[1].source, UsageSource::NotInvoked);
        assert!(ledger.is_reconciled());
    }

    #[test]
    fn test_suspicious_and_degraded_entries_are_separated() {
        let mut ledger = TokenLedger::new();
        ledger.record("TechLead", "ImplementFeature", &TokenUsage::reported(0, 0));
        ledger.record("Developer", "ImplementFeature", &TokenUsage::unavailable());
        ledger.record("QAEngineer", "RunTests", &TokenUsage::estimated("a b", "c"));

        assert_eq!(ledger.suspicious_entries().count(), 1);
        assert_eq!(ledger.degraded_entries().count(), 2);
    }

    #[test]
    fn test_top_consumers_orders_by_total() {
        let mut ledger = TokenLedger::new();
        ledger.record("A", "one", &TokenUsage::reported(1, 1));
        ledger.record("B", "two", &TokenUsage::reported(50, 50));
        ledger.record("C", "three", &TokenUsage::reported(10, 0));

        let top = ledger.top_consumers(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].action, "two");
        assert_eq!(top[1].action, "three");
    }

    #[test]
    fn test_ledger_serialises_totals_and_entries() {
        let mut ledger = TokenLedger::new();
        ledger.record("ProjectManager", "PlanWork", &TokenUsage::reported(3, 4));
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["input_tokens"], 3);
        assert_eq!(json["output_tokens"], 4);
        assert_eq!(json["total_tokens"], 7);
        assert_eq!(json["actions"][0]["role"], "ProjectManager");
        assert_eq!(json["actions"][0]["source"], "reported");
    }

    fn usage_strategy() -> impl Strategy<Value = TokenUsage> {
        (0u64..100_000, 0u64..100_000, 0u8..4).prop_map(|(i, o, s)| match s {
            0 => TokenUsage::reported(i, o),
            1 => TokenUsage {
                source: UsageSource::Estimated,
                ..TokenUsage::reported(i, o)
            },
            2 => TokenUsage::unavailable(),
            _ => TokenUsage::not_invoked(),
        })
    }

    proptest! {
        #[test]
        fn prop_totals_equal_sum_of_entries(usages in proptest::collection::vec(usage_strategy(), 0..64)) {
            let mut ledger = TokenLedger::new();
            for (i, usage) in usages.iter().enumerate() {
                ledger.record("Role", &format!("action_{}", i), usage);
                prop_assert!(ledger.is_reconciled());
            }
            let expected_in: u64 = usages.iter().map(|u| u.input_tokens.as_u64()).sum();
            let expected_out: u64 = usages.iter().map(|u| u.output_tokens.as_u64()).sum();
            prop_assert_eq!(ledger.input_tokens().as_u64(), expected_in);
            prop_assert_eq!(ledger.output_tokens().as_u64(), expected_out);
            prop_assert_eq!(ledger.entries().len(), usages.len());
        }
    }
}
