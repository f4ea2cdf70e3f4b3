//! # Seed Data Generator
//!
//! Populates a backend with the demo catalogue and a sales history.
//!
//! ## Usage
//! ```bash
//! # Seed a local Postgres (migrations run first)
//! DATABASE_URL=postgres://localhost/smartretail cargo run -p retail-store --bin seed
//!
//! # Seed the hosted project over REST, with 30 days of sales
//! RETAIL_BACKEND=rest SUPABASE_URL=... SUPABASE_SERVICE_ROLE_KEY=... \
//!     cargo run -p retail-store --bin seed -- --days 30
//! ```

use anyhow::{bail, Context};
use std::env;
use tracing_subscriber::EnvFilter;

use retail_store::{demo, Backend, BackendConfig, BackendKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut days: i64 = 14;
    let mut per_day: usize = 4;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--days" | "-d" => {
                if i + 1 < args.len() {
                    days = args[i + 1].parse().unwrap_or(days);
                    i += 1;
                }
            }
            "--per-day" | "-n" => {
                if i + 1 < args.len() {
                    per_day = args[i + 1].parse().unwrap_or(per_day);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("SmartRetail Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --days <N>       Days of sales history (default: 14)");
                println!("  -n, --per-day <N>    Sales per day (default: 4)");
                println!("  -h, --help           Show this help message");
                println!();
                println!("Backend is chosen by RETAIL_BACKEND (postgres | rest).");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let kind: BackendKind = env::var("RETAIL_BACKEND")
        .unwrap_or_else(|_| "postgres".to_string())
        .parse()?;
    if kind == BackendKind::Memory {
        bail!("seeding the memory backend has no lasting effect; pick postgres or rest");
    }

    let config = BackendConfig {
        kind,
        supabase_url: env::var("SUPABASE_URL").unwrap_or_default(),
        supabase_key: env::var("SUPABASE_KEY").unwrap_or_default(),
        service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
        database_url: env::var("DATABASE_URL").ok(),
        max_connections: Some(2),
    };

    let backend = Backend::connect(&config)
        .await
        .context("connecting to backend")?;

    let existing = backend.products().list(None, None).await?;
    if !existing.is_empty() {
        println!("⚠ Backend already has {} products", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let products = demo::seed_catalogue(&backend).await?;
    let sales = demo::seed_sales(&backend, &products, days, per_day).await?;

    println!(
        "✓ Seeded {} products and {} sales in {:?}",
        products.len(),
        sales,
        start.elapsed()
    );
    Ok(())
}
