//! Billing Gateway CLI - operator tool for the subscription billing backend.
//!
//! Usage:
//!   billing-gateway --config billing.toml plans
//!   billing-gateway customer <uid>
//!   billing-gateway cancel <uid> <sub_id>
//!   billing-gateway health
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod cli;
mod health;
mod observability;

use anyhow::{Context, Result, bail};
use billing_gateway::{
    BillingGateway, GatewayConfig, metrics::MetricsContext, models::NewSubscription,
};
use clap::Parser;
use cli::{Cli, Commands};
use observability::{HealthStatus, LogFormat, init_observability};
use serde_json::Value;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_observability(LogFormat::from_env());
    let cli = Cli::parse();

    let config = GatewayConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if matches!(cli.command, Commands::Health) {
        return report_health(&config).await;
    }

    let gateway = BillingGateway::from_config(&config).context("failed to build gateway")?;
    let context = cli.flow_id.map(|flow_id| MetricsContext::new().with("flow_id", flow_id));

    let result = run(&gateway, cli.command, context.as_ref()).await;
    gateway.close().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run(
    gateway: &BillingGateway,
    command: Commands,
    context: Option<&MetricsContext>,
) -> Result<Value> {
    let value = match command {
        Commands::Plans => serde_json::to_value(gateway.list_plans(context).await?)?,
        Commands::Customer { uid } => {
            serde_json::to_value(gateway.get_customer(&uid, context).await?)?
        }
        Commands::Subscriptions { uid } => {
            serde_json::to_value(gateway.list_subscriptions(&uid, context).await?)?
        }
        Commands::Subscribe(args) => {
            let subscription = NewSubscription {
                pmt_token: &args.token,
                plan_id: &args.plan,
                display_name: &args.name,
                email: &args.email,
            };
            let created = gateway.create_subscription(&args.uid, &subscription, context).await?;
            serde_json::to_value(created)?
        }
        Commands::Cancel { uid, sub_id } => {
            serde_json::to_value(gateway.cancel_subscription(&uid, &sub_id, context).await?)?
        }
        Commands::Reactivate { uid, sub_id } => {
            serde_json::to_value(gateway.reactivate_subscription(&uid, &sub_id, context).await?)?
        }
        Commands::UpdatePayment { uid, token } => {
            serde_json::to_value(gateway.update_customer(&uid, &token, context).await?)?
        }
        Commands::DeleteCustomer { uid } => {
            serde_json::to_value(gateway.delete_customer(&uid, context).await?)?
        }
        Commands::Health => bail!("health is not a gateway operation"),
    };
    Ok(value)
}

async fn report_health(config: &GatewayConfig) -> Result<()> {
    let report = health::run_checks(config).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(status = ?report.status, "health check complete");

    if report.status == HealthStatus::Unhealthy {
        bail!("billing gateway is unhealthy");
    }
    Ok(())
}
