//! Discovery or creation of a zone's rate limiting ruleset.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::api::types::{CreateRuleset, CreatedRuleset, RulesetSummary};
use crate::api::{ApiRequest, ApiTransport};
use crate::error::{ProvisionerError, Result};

/// The rate limiting ruleset of a zone and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRuleset {
    pub id: String,
    /// `true` when the ruleset did not exist and was created
    pub created: bool,
}

/// Finds a zone's `zone`/`http_ratelimit` ruleset, creating it when absent.
pub struct RulesetResolver<T: ApiTransport> {
    transport: Arc<T>,
}

impl<T: ApiTransport> RulesetResolver<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Return the id of the zone's rate limiting ruleset.
    ///
    /// The first listed entry with kind `zone` and phase `http_ratelimit`
    /// wins. A creation request is only issued when no entry matches; there
    /// is no re-check after creating.
    #[instrument(skip(self))]
    pub async fn resolve_or_create_ruleset(&self, zone_id: &str) -> Result<ResolvedRuleset> {
        if let Some(id) = self.find_ratelimit_ruleset(zone_id).await? {
            info!(zone_id, ruleset_id = %id, "Rate limiting ruleset found");
            return Ok(ResolvedRuleset { id, created: false });
        }

        info!(zone_id, "No rate limiting ruleset found, creating one");
        let id = self.create_ratelimit_ruleset(zone_id).await?;
        info!(zone_id, ruleset_id = %id, "Created rate limiting ruleset");

        Ok(ResolvedRuleset { id, created: true })
    }

    /// Look up the rate limiting ruleset without creating anything.
    pub async fn find_ratelimit_ruleset(&self, zone_id: &str) -> Result<Option<String>> {
        let context = format!("ruleset listing for zone {}", zone_id);
        let response = self
            .transport
            .send(ApiRequest::get(format!("/zones/{}/rulesets", zone_id)))
            .await?
            .require_success(&context)?;

        let rulesets: Vec<RulesetSummary> = response.result(&context)?;

        match rulesets.into_iter().find(RulesetSummary::is_zone_ratelimit) {
            Some(ruleset) if ruleset.id.is_empty() => Err(ProvisionerError::UnexpectedResponse(
                format!("{}: matching ruleset has an empty id", context),
            )),
            Some(ruleset) => Ok(Some(ruleset.id)),
            None => Ok(None),
        }
    }

    async fn create_ratelimit_ruleset(&self, zone_id: &str) -> Result<String> {
        let context = format!("ruleset creation for zone {}", zone_id);
        let body = serde_json::to_value(CreateRuleset::ratelimit())
            .map_err(|e| ProvisionerError::UnexpectedResponse(e.to_string()))?;

        let response = self
            .transport
            .send(ApiRequest::post(format!("/zones/{}/rulesets", zone_id), body))
            .await?;
        info!(zone_id, status = response.status, "Ruleset creation answered");

        let created: CreatedRuleset = response.require_success(&context)?.result(&context)?;
        if created.id.is_empty() {
            return Err(ProvisionerError::UnexpectedResponse(format!(
                "{}: created ruleset has no id",
                context
            )));
        }

        Ok(created.id)
    }

    /// Delete a ruleset. Maintenance action, never part of a reconciliation run.
    #[instrument(skip(self))]
    pub async fn delete_ruleset(&self, zone_id: &str, ruleset_id: &str) -> Result<u16> {
        warn!(zone_id, ruleset_id, "Deleting ruleset");

        let response = self
            .transport
            .send(ApiRequest::delete(format!(
                "/zones/{}/rulesets/{}",
                zone_id, ruleset_id
            )))
            .await?;
        let status = response.status;
        info!(zone_id, ruleset_id, status, "Ruleset deletion answered");

        response.require_success(&format!("deletion of ruleset {}", ruleset_id))?;
        Ok(status)
    }
}
