//! Cloudflare API resource shapes.
//!
//! Only the fields the provisioner reads are modelled; everything else in
//! the responses is ignored.

use serde::{Deserialize, Serialize};

/// Ruleset kind that scopes a ruleset to a single zone.
pub const RULESET_KIND_ZONE: &str = "zone";
/// Phase in which rate limiting rules execute.
pub const RULESET_PHASE_RATELIMIT: &str = "http_ratelimit";
/// Name given to rulesets created by the provisioner.
pub const RATELIMIT_RULESET_NAME: &str = "Rate Limiting ruleset";

/// A zone record from `GET /zones`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Pagination metadata of a listing response.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResultInfo {
    pub total_pages: u32,
}

/// An entry of `GET /zones/{zone_id}/rulesets`.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesetSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub phase: String,
}

impl RulesetSummary {
    /// Whether this is the zone's rate limiting ruleset.
    pub fn is_zone_ratelimit(&self) -> bool {
        self.kind == RULESET_KIND_ZONE && self.phase == RULESET_PHASE_RATELIMIT
    }
}

/// Body of `POST /zones/{zone_id}/rulesets`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRuleset<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub phase: &'a str,
}

impl CreateRuleset<'static> {
    pub fn ratelimit() -> Self {
        Self {
            name: RATELIMIT_RULESET_NAME,
            kind: RULESET_KIND_ZONE,
            phase: RULESET_PHASE_RATELIMIT,
        }
    }
}

/// The `result` of creating a ruleset.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRuleset {
    #[serde(default)]
    pub id: String,
}

/// A ruleset with its rules, from `GET /zones/{zone_id}/rulesets/{ruleset_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesetDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub rules: Vec<ExistingRule>,
}

/// A rule already present in a ruleset.
#[derive(Debug, Clone, Deserialize)]
pub struct ExistingRule {
    #[serde(default)]
    pub description: Option<String>,
}
