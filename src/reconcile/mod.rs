//! Reconciliation of rate limiting rulesets across zones.

mod catalogue;
mod reconciler;
mod rules;
mod rulesets;
mod zones;

pub use catalogue::{RateLimitSpec, RuleCatalogue, RuleDefinition};
pub use reconciler::{Reconciler, RunReport, ZoneOutcome, ZoneReport};
pub use rules::{RuleApplier, RuleOutcome};
pub use rulesets::{ResolvedRuleset, RulesetResolver};
pub use zones::ZoneEnumerator;
