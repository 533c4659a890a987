//! CLI commands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Invoice-View CLI
#[derive(Parser)]
#[command(name = "invoice-view")]
#[command(about = "Inspect and edit a remote invoices collection through its materialized view")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the REST base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Use a seeded in-memory backend instead of the REST server
    #[arg(long, global = true)]
    pub demo: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the invoices enriched with their customers
    List,
    /// Print the items of one invoice
    Items {
        /// Invoice ID
        invoice_id: u64,
    },
    /// Create an invoice
    Add {
        /// Customer ID
        #[arg(short = 'u', long)]
        customer_id: u64,
        /// Extra field as key=value; values are parsed as JSON when possible
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Delete an invoice
    Delete {
        /// Invoice ID
        id: u64,
    },
    /// Print the customer collection
    Customers,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}
