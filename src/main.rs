use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use billing_bridge::{
    config, init_config, init_telemetry, shutdown_telemetry, DryRunDestination, EntityType,
    FixedCohortService, JsonFixtureSource, MigrationOrchestrator,
};

#[derive(Parser)]
#[command(name = "billing-bridge")]
#[command(about = "Staged billing data migration with a human approval gate")]
#[command(long_about = "Billing Bridge moves billing records from a source ledger into a destination ERP: \
                       fetch, classify into cohorts, reshape to the destination schema, then write only \
                       the records you approve.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default destination schema for one or all entity types
    Schemas {
        /// Entity type to show (customers, transactions, subscriptions, plans)
        #[arg(long, help = "Only show this entity type's schema")]
        entity: Option<EntityType>,
    },
    /// Run a migration against a JSON fixture and a dry-run destination
    Run {
        /// Entity type to migrate
        #[arg(long, help = "customers, transactions, subscriptions or plans")]
        entity: EntityType,
        /// JSON file with source records
        #[arg(long, help = "Object keyed by entity type, or a bare array of records")]
        records: PathBuf,
        /// Cohort label assigned to every record
        #[arg(long, default_value = "standard", help = "Fixed cohort label used instead of a live classifier")]
        cohort: String,
        /// Record ids to approve before completing
        #[arg(long = "approve", help = "Approve this record id (repeatable)")]
        approve: Vec<String>,
        /// Approve every produced record
        #[arg(long, help = "Approve every record the pipeline produced")]
        approve_all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Schemas { entity } => schemas_command(entity),
        Commands::Run { entity, records, cohort, approve, approve_all } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                run_command(entity, records, cohort, approve, approve_all).await
            })
        }
    }
}

fn schemas_command(entity: Option<EntityType>) -> Result<()> {
    let entities = match entity {
        Some(entity) => vec![entity],
        None => EntityType::ALL.to_vec(),
    };

    let mut catalogue = serde_json::Map::new();
    for entity in entities {
        catalogue.insert(entity.to_string(), serde_json::to_value(entity.default_schema())?);
    }
    println!("{}", serde_json::to_string_pretty(&catalogue)?);
    Ok(())
}

async fn run_command(
    entity: EntityType,
    records: PathBuf,
    cohort: String,
    approve: Vec<String>,
    approve_all: bool,
) -> Result<()> {
    let settings = config()?;
    init_telemetry(&settings.observability)?;
    init_config()?;

    let source = JsonFixtureSource::from_path(&records, entity)
        .await
        .with_context(|| format!("Failed to load records from {}", records.display()))?;

    let orchestrator = MigrationOrchestrator::from_config(
        Arc::new(source),
        Arc::new(FixedCohortService::new(cohort)),
        Arc::new(DryRunDestination),
        settings,
    );

    // Live observer: one JSON line per ledger event on stdout.
    let mut subscription = orchestrator.subscribe().await;
    let observer = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
        }
    });

    let started = orchestrator.start(entity, entity.default_schema()).await;
    let summary = match started {
        Ok(summary) => summary,
        Err(e) => {
            drop(orchestrator);
            let _ = observer.await;
            shutdown_telemetry();
            bail!("❌ Migration failed: {e}");
        }
    };
    eprintln!(
        "📋 {} {} ready for approval ({} unclassified, {} field fallbacks)",
        summary.results, entity, summary.unclassified, summary.field_fallbacks
    );

    let to_approve: Vec<String> = if approve_all {
        orchestrator
            .snapshot()
            .await
            .results
            .unwrap_or_default()
            .iter()
            .map(|item| item.id().to_string())
            .collect()
    } else {
        approve
    };
    orchestrator.set_approval(to_approve, true).await;

    let destination = settings.destination.for_entity(entity);
    let outcome = orchestrator.complete(destination).await;
    // Dropping the orchestrator closes the stream once queued events are printed.
    drop(orchestrator);
    let _ = observer.await;
    shutdown_telemetry();

    let report = outcome?;
    eprintln!(
        "✅ Wrote {} of {} approved record(s); {} rejected",
        report.written.len(),
        report.attempted,
        report.rejected.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_repeated_approvals() {
        let cli = Cli::try_parse_from([
            "billing-bridge", "run", "--entity", "plans", "--records", "plans.json",
            "--approve", "p1", "--approve", "p2",
        ])
        .unwrap();

        match cli.command {
            Commands::Run { entity, approve, approve_all, cohort, .. } => {
                assert_eq!(entity, EntityType::Plans);
                assert_eq!(approve, vec!["p1", "p2"]);
                assert!(!approve_all);
                assert_eq!(cohort, "standard");
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn unknown_entity_is_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["billing-bridge", "schemas", "--entity", "invoices"]).is_err());
    }
}
