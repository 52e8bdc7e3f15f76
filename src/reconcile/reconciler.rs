//! Per-zone reconciliation runs.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::catalogue::RuleCatalogue;
use super::rules::{RuleApplier, RuleOutcome};
use super::rulesets::RulesetResolver;
use super::zones::ZoneEnumerator;
use crate::api::ApiTransport;
use crate::config::{ProvisionerConfig, ZoneSelection};
use crate::error::{ProvisionerError, Result};

/// What happened to a single zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneOutcome {
    /// The ruleset was resolved and every rule was attempted
    Applied {
        ruleset_id: String,
        ruleset_created: bool,
        rules: Vec<RuleOutcome>,
    },
    /// The zone was abandoned before its rules were attempted
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneReport {
    pub zone_id: String,
    pub outcome: ZoneOutcome,
}

/// Summary of a reconciliation run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub zones: Vec<ZoneReport>,
}

impl RunReport {
    pub fn zones_failed(&self) -> usize {
        self.zones
            .iter()
            .filter(|z| matches!(z.outcome, ZoneOutcome::Failed { .. }))
            .count()
    }

    pub fn rulesets_created(&self) -> usize {
        self.zones
            .iter()
            .filter(|z| {
                matches!(
                    z.outcome,
                    ZoneOutcome::Applied {
                        ruleset_created: true,
                        ..
                    }
                )
            })
            .count()
    }

    pub fn rules_failed(&self) -> usize {
        self.rule_outcomes().filter(|o| o.is_failure()).count()
    }

    pub fn rules_applied(&self) -> usize {
        self.rule_outcomes()
            .filter(|o| matches!(o, RuleOutcome::Created { .. }))
            .count()
    }

    /// Whether every zone and every rule went through.
    pub fn is_clean(&self) -> bool {
        self.zones_failed() == 0 && self.rules_failed() == 0
    }

    fn rule_outcomes(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.zones.iter().flat_map(|z| match &z.outcome {
            ZoneOutcome::Applied { rules, .. } => rules.as_slice(),
            ZoneOutcome::Failed { .. } => &[][..],
        })
    }
}

/// Drives enumeration, ruleset resolution and rule application, one zone at a time.
pub struct Reconciler<T: ApiTransport> {
    enumerator: ZoneEnumerator<T>,
    resolver: RulesetResolver<T>,
    applier: RuleApplier<T>,
    account_name: Option<String>,
    selection: ZoneSelection,
    catalogue: RuleCatalogue,
}

impl<T: ApiTransport> Reconciler<T> {
    pub fn new(transport: Arc<T>, config: &ProvisionerConfig, catalogue: RuleCatalogue) -> Self {
        Self {
            enumerator: ZoneEnumerator::new(transport.clone()),
            resolver: RulesetResolver::new(transport.clone()),
            applier: RuleApplier::new(transport).with_skip_existing(config.skip_existing_rules),
            account_name: config.account_name().map(str::to_string),
            selection: config.zones.clone(),
            catalogue,
        }
    }

    /// Reconcile every selected zone.
    ///
    /// Failing to determine the zones aborts the run. After that, each zone
    /// is its own failure boundary: an error is recorded in the report and
    /// the next zone is processed.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let zone_ids = self.select_zones().await?;

        info!(
            zones = zone_ids.len(),
            rules = self.catalogue.len(),
            "Starting reconciliation"
        );

        let mut zones = Vec::with_capacity(zone_ids.len());
        for zone_id in zone_ids {
            let outcome = match self.reconcile_zone(&zone_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(zone_id = %zone_id, error = %e, "Zone reconciliation failed, skipping");
                    ZoneOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            zones.push(ZoneReport { zone_id, outcome });
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            zones,
        };

        info!(
            zones = report.zones.len(),
            zones_failed = report.zones_failed(),
            rulesets_created = report.rulesets_created(),
            rules_applied = report.rules_applied(),
            rules_failed = report.rules_failed(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Reconciliation finished"
        );

        Ok(report)
    }

    /// Resolve the zones this run touches.
    ///
    /// Configured ids are deduplicated, first occurrence kept, since rule
    /// creation is not duplicate-safe.
    pub async fn select_zones(&self) -> Result<Vec<String>> {
        if !self.selection.ids.is_empty() {
            let mut seen = HashSet::new();
            let ids: Vec<String> = self
                .selection
                .ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect();

            if ids.len() < self.selection.ids.len() {
                warn!(
                    configured = self.selection.ids.len(),
                    unique = ids.len(),
                    "Ignoring duplicate configured zone ids"
                );
            }
            info!(zones = ids.len(), "Using configured zone ids");
            return Ok(ids);
        }

        let account_name = self.account_name.as_deref().ok_or_else(|| {
            ProvisionerError::Config("an account name is required to enumerate zones".into())
        })?;

        if self.selection.names.is_empty() {
            return self.enumerator.enumerate_zones(account_name).await;
        }

        let zones = self.enumerator.enumerate_zone_records(account_name).await?;
        let selected: Vec<String> = zones
            .into_iter()
            .filter(|zone| self.selection.names.contains(&zone.name))
            .map(|zone| zone.id)
            .collect();

        if selected.len() < self.selection.names.len() {
            warn!(
                requested = self.selection.names.len(),
                found = selected.len(),
                "Some configured zone names were not found on the account"
            );
        }

        Ok(selected)
    }

    #[instrument(skip(self))]
    async fn reconcile_zone(&self, zone_id: &str) -> Result<ZoneOutcome> {
        let ruleset = self.resolver.resolve_or_create_ruleset(zone_id).await?;
        let rules = self
            .applier
            .apply_rules(zone_id, &ruleset.id, &self.catalogue.rules)
            .await?;

        Ok(ZoneOutcome::Applied {
            ruleset_id: ruleset.id,
            ruleset_created: ruleset.created,
            rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::reconcile::catalogue::{RateLimitSpec, RuleDefinition};
    use reqwest::Method;
    use serde_json::{json, Value};

    fn config(account: Option<&str>, ids: &[&str], names: &[&str]) -> ProvisionerConfig {
        let mut config = ProvisionerConfig::default();
        config.api.auth_email = "ops@example.com".into();
        config.api.auth_key = "secret".into();
        config.account_name = account.map(str::to_string);
        config.zones.ids = ids.iter().map(|s| s.to_string()).collect();
        config.zones.names = names.iter().map(|s| s.to_string()).collect();
        config
    }

    fn catalogue(count: usize) -> RuleCatalogue {
        RuleCatalogue::new(
            (0..count)
                .map(|i| RuleDefinition {
                    description: format!("rule {}", i),
                    expression: "(http.request.uri.path eq \"/\")".into(),
                    action: "managed_challenge".into(),
                    ratelimit: RateLimitSpec {
                        characteristics: vec!["cf.colo.id".into(), "ip.src".into()],
                        period: 60,
                        requests_per_period: 100,
                        mitigation_timeout: 600,
                    },
                    enabled: true,
                })
                .collect(),
        )
    }

    fn zones_page(ids: &[&str]) -> Value {
        let result: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "name": format!("{}.com", id)}))
            .collect();
        json!({"result": result, "result_info": {"page": 1, "total_pages": 1}})
    }

    fn existing_ruleset(id: &str) -> Value {
        json!({"result": [{"id": id, "kind": "zone", "phase": "http_ratelimit"}]})
    }

    fn describe(transport: &MockTransport) -> Vec<String> {
        transport
            .requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    #[tokio::test]
    async fn test_single_zone_without_ruleset() {
        let transport = Arc::new(
            MockTransport::new()
                .on_query(Method::GET, "/zones", &[("account.name", "acme")], 200, zones_page(&["z1"]))
                .on(Method::GET, "/zones/z1/rulesets", 200, json!({"result": []}))
                .on(Method::POST, "/zones/z1/rulesets", 200, json!({"result": {"id": "rl1"}}))
                .on(Method::POST, "/zones/z1/rulesets/rl1/rules", 200, json!({"success": true})),
        );
        let reconciler = Reconciler::new(transport.clone(), &config(Some("acme"), &[], &[]), catalogue(2));

        let report = reconciler.run().await.unwrap();

        assert_eq!(
            describe(&transport),
            vec![
                "GET /zones",
                "GET /zones/z1/rulesets",
                "POST /zones/z1/rulesets",
                "POST /zones/z1/rulesets/rl1/rules",
                "POST /zones/z1/rulesets/rl1/rules",
            ]
        );
        assert_eq!(report.rulesets_created(), 1);
        assert_eq!(report.rules_applied(), 2);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_three_zones_with_existing_rulesets() {
        let mut transport = MockTransport::new().on_query(
            Method::GET,
            "/zones",
            &[("account.name", "acme")],
            200,
            zones_page(&["z1", "z2", "z3"]),
        );
        for zone in ["z1", "z2", "z3"] {
            let ruleset = format!("rl-{}", zone);
            transport = transport
                .on(Method::GET, &format!("/zones/{}/rulesets", zone), 200, existing_ruleset(&ruleset))
                .on(
                    Method::POST,
                    &format!("/zones/{}/rulesets/{}/rules", zone, ruleset),
                    200,
                    json!({"success": true}),
                );
        }
        let transport = Arc::new(transport);
        let reconciler = Reconciler::new(transport.clone(), &config(Some("acme"), &[], &[]), catalogue(4));

        let report = reconciler.run().await.unwrap();

        assert_eq!(transport.count_suffix(Method::POST, "/rulesets"), 0);
        assert_eq!(transport.count_suffix(Method::POST, "/rules"), 3 * 4);
        assert_eq!(report.rulesets_created(), 0);
        assert_eq!(report.zones.len(), 3);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_failing_zone_does_not_stop_the_next() {
        let transport = Arc::new(
            MockTransport::new()
                .fail(Method::GET, "/zones/bad/rulesets")
                .on(Method::GET, "/zones/good/rulesets", 200, existing_ruleset("rl"))
                .on(Method::POST, "/zones/good/rulesets/rl/rules", 200, json!({})),
        );
        let reconciler = Reconciler::new(transport.clone(), &config(None, &["bad", "good"], &[]), catalogue(1));

        let report = reconciler.run().await.unwrap();

        assert_eq!(report.zones_failed(), 1);
        assert!(matches!(report.zones[0].outcome, ZoneOutcome::Failed { .. }));
        assert_eq!(report.zones[1].zone_id, "good");
        assert!(matches!(report.zones[1].outcome, ZoneOutcome::Applied { .. }));
        assert!(!report.is_clean());
        assert_eq!(transport.count(Method::GET, "/zones"), 0);
    }

    #[tokio::test]
    async fn test_rule_failures_counted_but_zone_applied() {
        let transport = Arc::new(
            MockTransport::new()
                .on(Method::GET, "/zones/z1/rulesets", 200, existing_ruleset("rl"))
                .on(Method::POST, "/zones/z1/rulesets/rl/rules", 200, json!({}))
                .on(Method::POST, "/zones/z1/rulesets/rl/rules", 400, json!({"errors": []})),
        );
        let reconciler = Reconciler::new(transport.clone(), &config(None, &["z1"], &[]), catalogue(3));

        let report = reconciler.run().await.unwrap();

        assert_eq!(report.zones_failed(), 0);
        assert_eq!(report.rules_applied(), 1);
        assert_eq!(report.rules_failed(), 2);
        assert_eq!(transport.count(Method::POST, "/zones/z1/rulesets/rl/rules"), 3);
    }

    #[tokio::test]
    async fn test_duplicate_zone_ids_reconciled_once() {
        let transport = Arc::new(
            MockTransport::new()
                .on(Method::GET, "/zones/z1/rulesets", 200, existing_ruleset("rl1"))
                .on(Method::POST, "/zones/z1/rulesets/rl1/rules", 200, json!({}))
                .on(Method::GET, "/zones/z2/rulesets", 200, existing_ruleset("rl2"))
                .on(Method::POST, "/zones/z2/rulesets/rl2/rules", 200, json!({})),
        );
        let reconciler = Reconciler::new(transport.clone(), &config(None, &["z1", "z2", "z1"], &[]), catalogue(2));

        assert_eq!(reconciler.select_zones().await.unwrap(), vec!["z1", "z2"]);

        let report = reconciler.run().await.unwrap();
        assert_eq!(report.zones.len(), 2);
        assert_eq!(transport.count(Method::POST, "/zones/z1/rulesets/rl1/rules"), 2);
    }

    #[tokio::test]
    async fn test_zone_names_filter() {
        let transport = Arc::new(MockTransport::new().on_query(
            Method::GET,
            "/zones",
            &[("account.name", "acme")],
            200,
            zones_page(&["a", "b", "c"]),
        ));
        let reconciler = Reconciler::new(
            transport,
            &config(Some("acme"), &[], &["c.com", "a.com", "missing.com"]),
            catalogue(1),
        );

        let zones = reconciler.select_zones().await.unwrap();
        assert_eq!(zones, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_enumeration_failure_aborts_run() {
        let transport = Arc::new(MockTransport::new().on_query(
            Method::GET,
            "/zones",
            &[("account.name", "acme")],
            401,
            json!({"success": false}),
        ));
        let reconciler = Reconciler::new(transport.clone(), &config(Some("acme"), &[], &[]), catalogue(1));

        let err = reconciler.run().await.unwrap_err();
        assert!(matches!(err, ProvisionerError::Status { status: 401, .. }));
        assert_eq!(transport.requests().len(), 1);
    }
}
