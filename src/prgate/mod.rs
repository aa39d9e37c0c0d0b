//! PR Strategy Gate (§4.3 / §2.3).
//!
//! Decides, given a changeset's configured PR strategy and its parent's
//! review state, whether a PR should be opened now, deferred, or skipped.

use crate::ticket::ReviewLifecycle;

pub const PR_STRATEGY_VALUES: &[&str] = &["parallel", "sequential", "on-ready", "on-parent-approved"];

/// Normalize a raw `pr_strategy` field, defaulting unknown/absent values to
/// `sequential`.
pub fn normalize_pr_strategy(raw: Option<&str>) -> &'static str {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("parallel") => "parallel",
        Some("on-ready") => "on-ready",
        Some("on-parent-approved") => "on-parent-approved",
        Some("sequential") => "sequential",
        _ => "sequential",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrAction {
    OpenNow,
    Defer,
    Skip,
}

/// Decision returned by [`pr_strategy_decision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrStrategyDecision {
    pub strategy: &'static str,
    pub action: PrAction,
    pub reason: &'static str,
}

/// Decide whether to open a PR now, given the changeset's strategy and its
/// parent changeset's review state (`None` when there is no parent, i.e. an
/// epic root changeset).
pub fn pr_strategy_decision(
    strategy: Option<&str>,
    parent_state: Option<ReviewLifecycle>,
) -> PrStrategyDecision {
    let strategy = normalize_pr_strategy(strategy);

    match strategy {
        "parallel" => PrStrategyDecision {
            strategy,
            action: PrAction::OpenNow,
            reason: "parallel-strategy-always-opens",
        },
        _ if parent_state.is_none() => PrStrategyDecision {
            strategy,
            action: PrAction::OpenNow,
            reason: "no-parent-opens-immediately",
        },
        "on-ready" => PrStrategyDecision {
            strategy,
            action: PrAction::OpenNow,
            reason: "on-ready-strategy-always-opens",
        },
        "on-parent-approved" => {
            let approved = matches!(
                parent_state,
                Some(ReviewLifecycle::Approved) | Some(ReviewLifecycle::Merged)
            );
            if approved {
                PrStrategyDecision {
                    strategy,
                    action: PrAction::OpenNow,
                    reason: "parent-approved",
                }
            } else {
                PrStrategyDecision {
                    strategy,
                    action: PrAction::Defer,
                    reason: "awaiting-parent-approval",
                }
            }
        }
        _ => {
            // sequential (default): open once the parent is integrated.
            let integrated = parent_state.map(|s| s.is_integrated()).unwrap_or(false);
            if integrated {
                PrStrategyDecision {
                    strategy,
                    action: PrAction::OpenNow,
                    reason: "parent-integrated",
                }
            } else {
                PrStrategyDecision {
                    strategy,
                    action: PrAction::Defer,
                    reason: "awaiting-parent-integration",
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_always_opens() {
        let decision = pr_strategy_decision(Some("parallel"), Some(ReviewLifecycle::InReview));
        assert_eq!(decision.action, PrAction::OpenNow);
    }

    #[test]
    fn no_parent_opens_immediately_regardless_of_strategy() {
        let decision = pr_strategy_decision(Some("sequential"), None);
        assert_eq!(decision.action, PrAction::OpenNow);
        assert_eq!(decision.reason, "no-parent-opens-immediately");
    }

    #[test]
    fn sequential_defers_until_parent_merged() {
        let waiting = pr_strategy_decision(Some("sequential"), Some(ReviewLifecycle::InReview));
        assert_eq!(waiting.action, PrAction::Defer);

        let ready = pr_strategy_decision(Some("sequential"), Some(ReviewLifecycle::Merged));
        assert_eq!(ready.action, PrAction::OpenNow);
    }

    #[test]
    fn on_parent_approved_accepts_approved_or_merged() {
        let waiting =
            pr_strategy_decision(Some("on-parent-approved"), Some(ReviewLifecycle::PrOpen));
        assert_eq!(waiting.action, PrAction::Defer);

        let approved =
            pr_strategy_decision(Some("on-parent-approved"), Some(ReviewLifecycle::Approved));
        assert_eq!(approved.action, PrAction::OpenNow);
    }

    #[test]
    fn unknown_strategy_defaults_to_sequential() {
        assert_eq!(normalize_pr_strategy(Some("bogus")), "sequential");
        assert_eq!(normalize_pr_strategy(None), "sequential");
    }
}
