//! Invoice-View: Main entry point

use clap::Parser;
use invoice_view::cli::{Cli, Commands};
use invoice_view::config::Config;
use invoice_view::error::{Error, Result};
use invoice_view::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.http.base_url = base_url;
        config.validate()?;
    }

    let transport: Arc<dyn Transport> = if cli.demo {
        Arc::new(demo_backend(&config))
    } else {
        Arc::new(HttpTransport::new(&config.http)?)
    };
    let (store, customers) = InvoiceStore::with_transport(transport, config.store.clone());

    match cli.command {
        Commands::List => {
            let invoices = next_state(store.request_collection()?).await?;
            print_json(&*invoices)
        }
        Commands::Items { invoice_id } => {
            let mut items = store.request_items(RecordId(invoice_id))?;
            let items = items
                .next()
                .await
                .ok_or_else(|| Error::Closed("items stream ended".to_string()))??;
            print_json(&*items)
        }
        Commands::Add { customer_id, fields } => {
            let mut payload = NewInvoice::new(customer_id);
            for (key, raw) in fields {
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                payload.fields.insert(key, value);
            }
            let created = store.submit_add(payload).await?;
            print_json(&created)
        }
        Commands::Delete { id } => {
            store.submit_delete(RecordId(id)).await?;
            print_json(&json!({ "deleted": id }))
        }
        Commands::Customers => print_json(&*customers.list().await?),
    }
}

async fn next_state(mut view: Subscription<ViewState>) -> Result<Snapshot<EnrichedInvoice>> {
    view.next()
        .await
        .ok_or_else(|| Error::Closed("invoice view ended".to_string()))?
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn demo_backend(config: &Config) -> InMemoryTransport {
    let invoices = &config.store.invoices_resource;
    InMemoryTransport::new()
        .with_collection(
            config.store.customers_resource.clone(),
            vec![
                json!({"id": 1, "name": "Mark Benson", "phone": "555-1234"}),
                json!({"id": 2, "name": "Bob Smith", "phone": "555-2345"}),
                json!({"id": 3, "name": "John Draper", "phone": "555-3456"}),
            ],
        )
        .with_collection(
            invoices.clone(),
            vec![
                json!({"id": 1, "customer_id": 1, "discount": 10, "total": 153.9}),
                json!({"id": 2, "customer_id": 2, "discount": 0, "total": 42.0}),
                json!({"id": 3, "customer_id": 4, "discount": 5, "total": 9.5}),
            ],
        )
        .with_collection(
            format!("{invoices}/1/{}", config.store.items_resource),
            vec![
                json!({"id": 1, "invoice_id": 1, "product_id": 7, "quantity": 2}),
                json!({"id": 2, "invoice_id": 1, "product_id": 3, "quantity": 1}),
            ],
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshots_print_as_json() {
        let invoices: Snapshot<Invoice> = Arc::new(vec![Invoice::new(1, 9)]);
        assert!(print_json(&*invoices).is_ok());
    }
}
