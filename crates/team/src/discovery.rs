//! Feature discovery escalation.
//!
//! After the core is built the orchestrator needs implementable features. When
//! the analysis has none, or only core items, it escalates through a fixed
//! sequence of re-analysis actions. Each failure mode gets its own bounded
//! budget; running out is fatal.

use pipeline::{extract_features, CrewForgeError, FeatureSpec};
use serde_json::{Map, Value};

use crate::actions::ActionKind;

/// Escalations allowed per failure mode.
pub const MAX_ESCALATIONS_PER_MODE: usize = 2;

const EMPTY_SEQUENCE: [ActionKind; 2] = [ActionKind::RefineRequirements, ActionKind::BreakdownSystem];
const CORE_ONLY_SEQUENCE: [ActionKind; 1] = [ActionKind::IdentifyFeatures];

/// What to do with the current analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryStep {
    /// Implement these (non-core) features.
    Ready(Vec<FeatureSpec>),
    /// Run `action` with `feedback`, then evaluate its result.
    Escalate { action: ActionKind, feedback: String },
}

/// Tracks escalations across successive analyses.
#[derive(Debug, Clone)]
pub struct FeatureDiscoveryPolicy {
    max_per_mode: usize,
    empty_escalations: usize,
    core_only_escalations: usize,
}

impl Default for FeatureDiscoveryPolicy {
    fn default() -> Self {
        Self::new(MAX_ESCALATIONS_PER_MODE)
    }
}

impl FeatureDiscoveryPolicy {
    pub fn new(max_per_mode: usize) -> Self {
        Self {
            max_per_mode,
            empty_escalations: 0,
            core_only_escalations: 0,
        }
    }

    /// Total escalations issued so far.
    pub fn escalations(&self) -> usize {
        self.empty_escalations + self.core_only_escalations
    }

    /// Decides the next step for `analysis`.
    pub fn next(&mut self, analysis: &Map<String, Value>) -> Result<DiscoveryStep, CrewForgeError> {
        let features = extract_features(analysis);
        if features.is_empty() {
            if self.empty_escalations >= self.max_per_mode {
                return Err(self.exhausted("the analysis lists no features or components"));
            }
            let action = EMPTY_SEQUENCE[self.empty_escalations.min(EMPTY_SEQUENCE.len() - 1)];
            self.empty_escalations += 1;
            return Ok(DiscoveryStep::Escalate {
                action,
                feedback: "No features were found in the analysis. List concrete, \
                           independently implementable features or components."
                    .to_string(),
            });
        }

        let remaining: Vec<FeatureSpec> = features.iter().filter(|f| !f.is_core()).cloned().collect();
        if !remaining.is_empty() {
            return Ok(DiscoveryStep::Ready(remaining));
        }

        if self.core_only_escalations >= self.max_per_mode {
            return Err(self.exhausted("the analysis only lists core functionality"));
        }
        let action = CORE_ONLY_SEQUENCE[self.core_only_escalations.min(CORE_ONLY_SEQUENCE.len() - 1)];
        self.core_only_escalations += 1;
        let core: Vec<&str> = features.iter().map(|f| f.name.as_str()).collect();
        Ok(DiscoveryStep::Escalate {
            action,
            feedback: format!(
                "Only core functionality was found ({}), and it is already implemented. \
                 Identify the features to build on top of it.",
                core.join(", ")
            ),
        })
    }

    fn exhausted(&self, reason: &str) -> CrewForgeError {
        CrewForgeError::FeatureDiscoveryExhausted {
            escalations: self.escalations(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_non_core_features_are_ready() {
        let mut policy = FeatureDiscoveryPolicy::default();
        let step = policy
            .next(&analysis(json!({"specification": {"features": [{"name": "core", "type": "core"}, "search"]}})))
            .unwrap();
        match step {
            DiscoveryStep::Ready(features) => {
                assert_eq!(features.len(), 1);
                assert_eq!(features[0].name.as_str(), "search");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(policy.escalations(), 0);
    }

    #[test]
    fn test_empty_analysis_escalates_refine_then_breakdown_then_fails() {
        let mut policy = FeatureDiscoveryPolicy::default();
        let empty = analysis(json!({"specification": {}}));

        let first = policy.next(&empty).unwrap();
        assert!(matches!(first, DiscoveryStep::Escalate { action: ActionKind::RefineRequirements, .. }));
        let second = policy.next(&empty).unwrap();
        assert!(matches!(second, DiscoveryStep::Escalate { action: ActionKind::BreakdownSystem, .. }));

        let err = policy.next(&empty).unwrap_err();
        assert_eq!(
            err,
            CrewForgeError::FeatureDiscoveryExhausted {
                escalations: 2,
                reason: "the analysis lists no features or components".into()
            }
        );
    }

    #[test]
    fn test_core_only_analysis_escalates_identify_features() {
        let mut policy = FeatureDiscoveryPolicy::default();
        let core_only = analysis(json!({"components": ["core_engine"]}));

        for _ in 0..MAX_ESCALATIONS_PER_MODE {
            match policy.next(&core_only).unwrap() {
                DiscoveryStep::Escalate { action, feedback } => {
                    assert_eq!(action, ActionKind::IdentifyFeatures);
                    assert!(feedback.contains("core_engine"));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(
            policy.next(&core_only),
            Err(CrewForgeError::FeatureDiscoveryExhausted { escalations: 2, .. })
        ));
    }

    #[test]
    fn test_budgets_are_per_mode() {
        let mut policy = FeatureDiscoveryPolicy::new(1);
        assert!(policy.next(&Map::new()).is_ok());
        assert!(policy.next(&analysis(json!({"features": ["core"]}))).is_ok());
        assert_eq!(policy.escalations(), 2);
        assert!(policy.next(&Map::new()).is_err());
    }
}
