//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "billing-gateway")]
#[command(version)]
#[command(
    about = "Inspect and manage customers on the subscription billing backend",
    long_about = None
)]
pub struct Cli {
    /// Gateway configuration file (TOML)
    #[arg(short, long, env = "BILLING_GATEWAY_CONFIG", default_value = "billing-gateway.toml")]
    pub config: PathBuf,

    /// Flow id attached to emitted performance events
    #[arg(long)]
    pub flow_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available plans
    Plans,

    /// Show a customer's billing record
    Customer {
        /// Account identifier
        uid: String,
    },

    /// List a customer's subscriptions
    Subscriptions {
        /// Account identifier
        uid: String,
    },

    /// Subscribe a customer to a plan
    Subscribe(SubscribeArgs),

    /// Cancel a subscription at the end of its period
    Cancel {
        /// Account identifier
        uid: String,
        /// Subscription identifier
        sub_id: String,
    },

    /// Reverse a pending cancellation
    Reactivate {
        /// Account identifier
        uid: String,
        /// Subscription identifier
        sub_id: String,
    },

    /// Replace a customer's payment method
    UpdatePayment {
        /// Account identifier
        uid: String,
        /// Payment token from the processor
        #[arg(long, env = "BILLING_PAYMENT_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Delete a customer's billing record
    DeleteCustomer {
        /// Account identifier
        uid: String,
    },

    /// Check configuration and backend reachability
    Health,
}

#[derive(Parser, Debug)]
pub struct SubscribeArgs {
    /// Account identifier
    pub uid: String,

    /// Plan to subscribe to
    #[arg(long)]
    pub plan: String,

    /// Payment token from the processor
    #[arg(long, env = "BILLING_PAYMENT_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Customer display name
    #[arg(long)]
    pub name: String,

    /// Customer email address
    #[arg(long)]
    pub email: String,
}
