//! The dispatch decision.
//!
//! A run does exactly one of three things. The choice is an ordered rule
//! table evaluated top to bottom; the first rule whose predicate holds wins,
//! and the final rule always matches.

use std::fmt;

use serde::Serialize;

/// What a run does after reading changeset state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchDecision {
    /// Nothing to version or publish.
    Noop,
    /// Publish packages and create releases.
    PublishReleases,
    /// Open or update the version pull request.
    VersionPr,
}

impl fmt::Display for DispatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => write!(f, "noop"),
            Self::PublishReleases => write!(f, "publish-releases"),
            Self::VersionPr => write!(f, "version-pr"),
        }
    }
}

/// Inputs to [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchInputs {
    /// At least one pending changeset.
    pub has_changesets: bool,
    /// Triggered by `workflow_dispatch`.
    pub manual_dispatch: bool,
    /// A `publish` script is configured.
    pub has_publish_script: bool,
}

struct Rule {
    name: &'static str,
    applies: fn(&DispatchInputs) -> bool,
    decision: DispatchDecision,
}

const RULES: &[Rule] = &[
    Rule {
        name: "pending changesets",
        applies: |i| i.has_changesets,
        decision: DispatchDecision::VersionPr,
    },
    Rule {
        name: "manual dispatch or publish script",
        applies: |i| i.manual_dispatch || i.has_publish_script,
        decision: DispatchDecision::PublishReleases,
    },
    Rule {
        name: "fallback",
        applies: |_| true,
        decision: DispatchDecision::Noop,
    },
];

/// Choose what to do for this run.
pub fn decide(has_changesets: bool, manual_dispatch: bool, has_publish_script: bool) -> DispatchDecision {
    decide_with(&DispatchInputs {
        has_changesets,
        manual_dispatch,
        has_publish_script,
    })
}

/// [`decide`] over a [`DispatchInputs`] value.
pub fn decide_with(inputs: &DispatchInputs) -> DispatchDecision {
    let rule = RULES
        .iter()
        .find(|rule| (rule.applies)(inputs))
        .unwrap_or(&RULES[RULES.len() - 1]);
    tracing::debug!(rule = rule.name, decision = %rule.decision, ?inputs, "dispatch decided");
    rule.decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use DispatchDecision::*;

    #[test]
    fn decision_table_is_total() {
        let cases = [
            ((true, true, true), VersionPr),
            ((true, true, false), VersionPr),
            ((true, false, true), VersionPr),
            ((true, false, false), VersionPr),
            ((false, true, true), PublishReleases),
            ((false, true, false), PublishReleases),
            ((false, false, true), PublishReleases),
            ((false, false, false), Noop),
        ];
        for ((changesets, manual, script), expected) in cases {
            assert_eq!(
                decide(changesets, manual, script),
                expected,
                "changesets={changesets} manual={manual} script={script}"
            );
        }
    }

    #[test]
    fn last_rule_always_matches() {
        let last = RULES.last().unwrap();
        assert!((last.applies)(&DispatchInputs {
            has_changesets: false,
            manual_dispatch: false,
            has_publish_script: false,
        }));
    }

    #[test]
    fn display_is_kebab_case() {
        assert_eq!(PublishReleases.to_string(), "publish-releases");
        assert_eq!(
            serde_json::to_string(&VersionPr).unwrap(),
            "\"version-pr\""
        );
    }
}
