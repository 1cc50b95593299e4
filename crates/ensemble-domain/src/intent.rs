//! Keyword intent classification for dynamic dispatch.
//!
//! Requests are lowercased and matched against the configured rules by
//! substring. Each capability appears at most once, in rule order. When
//! nothing matches the configured fallback set is used.

use ensemble_config::{DispatcherConfig, IntentRule};
use ensemble_types::CompositionKind;
use serde::Serialize;

/// Capabilities and composition chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub members: Vec<String>,
    pub pattern: CompositionKind,
    pub request: String,
    /// True when no rule matched and the fallback set was used.
    pub fallback: bool,
}

/// Ordered keyword rules plus the parallel trigger words.
#[derive(Debug, Clone)]
pub struct IntentTable {
    rules: Vec<IntentRule>,
    fallback: Vec<String>,
    parallel_triggers: Vec<String>,
}

impl IntentTable {
    pub fn new(
        rules: Vec<IntentRule>,
        fallback: Vec<String>,
        parallel_triggers: Vec<String>,
    ) -> Self {
        let lower = |words: Vec<String>| -> Vec<String> {
            words.into_iter().map(|w| w.to_lowercase()).collect()
        };
        Self {
            rules: rules
                .into_iter()
                .map(|rule| IntentRule {
                    capability: rule.capability,
                    keywords: lower(rule.keywords),
                })
                .collect(),
            fallback,
            parallel_triggers: lower(parallel_triggers),
        }
    }

    /// Capability ids requested by `request`, in rule order.
    ///
    /// Returns the fallback set when no keyword matches.
    pub fn members(&self, request: &str) -> (Vec<String>, bool) {
        let text = request.to_lowercase();
        let mut members: Vec<String> = Vec::new();
        for rule in &self.rules {
            if members.contains(&rule.capability) {
                continue;
            }
            if rule.keywords.iter().any(|kw| text.contains(kw.as_str())) {
                members.push(rule.capability.clone());
            }
        }

        if members.is_empty() {
            (self.fallback.clone(), true)
        } else {
            (members, false)
        }
    }

    /// Parallel when any trigger word appears, sequential otherwise.
    pub fn pattern(&self, request: &str) -> CompositionKind {
        let text = request.to_lowercase();
        if self
            .parallel_triggers
            .iter()
            .any(|trigger| text.contains(trigger.as_str()))
        {
            CompositionKind::Parallel
        } else {
            CompositionKind::Sequential
        }
    }

    pub fn classify(&self, request: &str) -> Classification {
        let (members, fallback) = self.members(request);
        Classification {
            members,
            pattern: self.pattern(request),
            request: request.to_string(),
            fallback,
        }
    }

    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }
}

impl From<&DispatcherConfig> for IntentTable {
    fn from(config: &DispatcherConfig) -> Self {
        Self::new(
            config.rules.clone(),
            config.fallback.clone(),
            config.parallel_triggers.clone(),
        )
    }
}

impl Default for IntentTable {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}
