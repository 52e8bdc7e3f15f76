//! Best-effort application of the rule catalogue to a ruleset.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::catalogue::RuleDefinition;
use crate::api::types::RulesetDetail;
use crate::api::{ApiRequest, ApiResponse, ApiTransport};
use crate::error::{ProvisionerError, Result};

/// Result of submitting one rule definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The API accepted the rule
    Created { description: String, status: u16 },
    /// The API answered with a non-success status
    Rejected {
        description: String,
        status: u16,
        errors: Vec<String>,
    },
    /// The request never got an answer
    Failed { description: String, error: String },
    /// A rule with the same description already exists in the ruleset
    Skipped { description: String },
}

impl RuleOutcome {
    pub fn description(&self) -> &str {
        match self {
            RuleOutcome::Created { description, .. }
            | RuleOutcome::Rejected { description, .. }
            | RuleOutcome::Failed { description, .. }
            | RuleOutcome::Skipped { description } => description.as_str(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RuleOutcome::Rejected { .. } | RuleOutcome::Failed { .. })
    }

    /// HTTP status of the creation request, when one was answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RuleOutcome::Created { status, .. } | RuleOutcome::Rejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOutcome::Created { description, status } => {
                write!(f, "created '{}' ({})", description, status)
            }
            RuleOutcome::Rejected { description, status, errors } => {
                write!(f, "rejected '{}' ({})", description, status)?;
                if !errors.is_empty() {
                    write!(f, ": {}", errors.join("; "))?;
                }
                Ok(())
            }
            RuleOutcome::Failed { description, error } => {
                write!(f, "failed '{}': {}", description, error)
            }
            RuleOutcome::Skipped { description } => write!(f, "skipped '{}' (exists)", description),
        }
    }
}

/// Submits rule definitions to a ruleset's rules collection.
pub struct RuleApplier<T: ApiTransport> {
    transport: Arc<T>,
    skip_existing: bool,
}

impl<T: ApiTransport> RuleApplier<T> {
    /// Create an applier that re-creates every definition on each run.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            skip_existing: false,
        }
    }

    /// Skip definitions whose description is already present in the ruleset.
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Submit every definition, in order, returning one outcome per definition.
    ///
    /// A failed rule never stops the remaining ones. The only error is a
    /// failed lookup of existing rules when skipping is enabled, in which
    /// case nothing is submitted.
    #[instrument(skip(self, rules), fields(rule_count = rules.len()))]
    pub async fn apply_rules(
        &self,
        zone_id: &str,
        ruleset_id: &str,
        rules: &[RuleDefinition],
    ) -> Result<Vec<RuleOutcome>> {
        let existing = if self.skip_existing {
            self.existing_descriptions(zone_id, ruleset_id).await?
        } else {
            HashSet::new()
        };

        let path = format!("/zones/{}/rulesets/{}/rules", zone_id, ruleset_id);
        let mut outcomes = Vec::with_capacity(rules.len());

        for rule in rules {
            let outcome = if existing.contains(&rule.description) {
                RuleOutcome::Skipped {
                    description: rule.description.clone(),
                }
            } else {
                self.create_rule(&path, rule).await
            };

            if outcome.is_failure() {
                warn!(zone_id, ruleset_id, outcome = %outcome, "Rule not applied");
            } else {
                info!(zone_id, ruleset_id, outcome = %outcome, "Rule applied");
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn create_rule(&self, path: &str, rule: &RuleDefinition) -> RuleOutcome {
        let description = rule.description.clone();

        let body = match serde_json::to_value(rule) {
            Ok(body) => body,
            Err(e) => {
                return RuleOutcome::Failed {
                    description,
                    error: e.to_string(),
                }
            }
        };

        match self.transport.send(ApiRequest::post(path, body)).await {
            Ok(response) if response.is_success() => RuleOutcome::Created {
                description,
                status: response.status,
            },
            Ok(response) => RuleOutcome::Rejected {
                description,
                status: response.status,
                errors: error_messages(&response),
            },
            Err(e) => RuleOutcome::Failed {
                description,
                error: e.to_string(),
            },
        }
    }

    async fn existing_descriptions(&self, zone_id: &str, ruleset_id: &str) -> Result<HashSet<String>> {
        let context = format!("lookup of ruleset {}", ruleset_id);
        let response = self
            .transport
            .send(ApiRequest::get(format!("/zones/{}/rulesets/{}", zone_id, ruleset_id)))
            .await?
            .require_success(&context)?;

        let detail: RulesetDetail = response.result(&context)?;
        if detail.id != ruleset_id {
            return Err(ProvisionerError::UnexpectedResponse(format!(
                "{}: response describes ruleset '{}'",
                context, detail.id
            )));
        }

        let descriptions: HashSet<String> = detail
            .rules
            .into_iter()
            .filter_map(|rule| rule.description)
            .collect();
        debug!(zone_id, ruleset_id, existing = descriptions.len(), "Loaded existing rules");

        Ok(descriptions)
    }
}

fn error_messages(response: &ApiResponse) -> Vec<String> {
    response
        .body
        .get("errors")
        .and_then(|errors| errors.as_array())
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
