use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ratelimit_provisioner::api::HttpTransport;
use ratelimit_provisioner::config::ProvisionerConfig;
use ratelimit_provisioner::reconcile::{
    Reconciler, RuleCatalogue, RulesetResolver, ZoneOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "ratelimit-provisioner")]
#[command(about = "Provision Cloudflare rate limiting rules across account zones", version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "RLP_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ensure every selected zone has a rate limiting ruleset and apply the rule catalogue
    Reconcile,
    /// Print the zones a reconciliation run would touch
    ListZones,
    /// Delete a ruleset from a zone
    DeleteRuleset {
        #[arg(long)]
        zone: String,
        #[arg(long)]
        ruleset: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting Ratelimit Provisioner");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ProvisionerConfig::load(args.config.as_deref())?;
    info!(base_url = %config.api.base_url, "Configuration loaded");

    let transport = Arc::new(HttpTransport::new(&config.api)?);

    match args.command.unwrap_or(Command::Reconcile) {
        Command::Reconcile => {
            config.validate()?;
            let catalogue = match &config.rules_path {
                Some(path) => RuleCatalogue::from_file(path)?,
                None => RuleCatalogue::builtin(),
            };
            info!(rules = catalogue.len(), "Rule catalogue loaded");

            let report = Reconciler::new(transport, &config, catalogue).run().await?;
            for zone in &report.zones {
                match &zone.outcome {
                    ZoneOutcome::Applied { ruleset_id, rules, .. } => {
                        for rule in rules {
                            println!("{}\t{}\t{}", zone.zone_id, ruleset_id, rule);
                        }
                    }
                    ZoneOutcome::Failed { error } => {
                        println!("{}\t-\tzone failed: {}", zone.zone_id, error);
                    }
                }
            }

            if !report.is_clean() {
                anyhow::bail!(
                    "{} zone(s) failed, {} rule(s) not applied",
                    report.zones_failed(),
                    report.rules_failed()
                );
            }
        }
        Command::ListZones => {
            config.validate()?;
            let zones = Reconciler::new(transport, &config, RuleCatalogue::default())
                .select_zones()
                .await?;
            for zone_id in zones {
                println!("{}", zone_id);
            }
        }
        Command::DeleteRuleset { zone, ruleset } => {
            warn!(zone_id = %zone, ruleset_id = %ruleset, "Ruleset deletion requested");
            let status = RulesetResolver::new(transport)
                .delete_ruleset(&zone, &ruleset)
                .await?;
            info!(status, "Ruleset deleted");
        }
    }

    info!("Ratelimit Provisioner finished");
    Ok(())
}

/// Initialize tracing, honouring `RUST_LOG` and defaulting to `info`.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
