//! Seed script for testboard
//!
//! Creates (or resets the password of) a login user, storing only a bcrypt
//! hash, and optionally inserts a handful of sample projects and tests spread
//! over recent months so the report endpoints have something to show.
//! Run: cargo run --bin seed_data -- --username admin --password secret --sample

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::info;

use testboard::auth::{hash_password, DEFAULT_COST};
use testboard::config::{LogFormat, DEFAULT_DATABASE_URL};
use testboard::logging;
use testboard::models::{ProjectFields, TestFields, TestStatus};
use testboard::storage::Storage;

#[derive(Parser)]
#[command(name = "seed_data", about = "Create a login user and optional sample data")]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    #[arg(short, long)]
    username: String,

    #[arg(short, long)]
    password: String,

    #[arg(long, default_value_t = DEFAULT_COST)]
    cost: u32,

    /// Also insert sample projects and tests
    #[arg(long)]
    sample: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let _guard = logging::init(LogFormat::Pretty, None);

    let storage = Storage::open(&args.database_url)
        .await
        .with_context(|| format!("failed to open database {}", args.database_url))?;

    let hash = hash_password(&args.password, args.cost).context("failed to hash password")?;
    let user_id = storage.upsert_user(&args.username, &hash).await?;
    info!(user_id, username = %args.username, "user ready");

    if args.sample {
        seed_sample(&storage, user_id).await?;
    }

    storage.close().await;
    Ok(())
}

async fn seed_sample(storage: &Storage, user_id: i64) -> anyhow::Result<()> {
    let now = Utc::now();
    let projects = [
        ("Checkout", "Cart, payment and receipts", "active"),
        ("Search", "Catalog search and filters", "pending"),
        ("Onboarding", "Sign-up and first-run flow", "completed"),
    ];

    let mut project_ids = Vec::new();
    for (name, description, status) in projects {
        let fields = ProjectFields {
            name: name.to_string(),
            description: Some(description.to_string()),
            status: Some(status.to_string()),
        };
        project_ids.push(storage.create_project(&fields, now).await?);
    }

    // Cycle statuses and spread creation dates back over eight months.
    let mut created = 0;
    for i in 0..24i64 {
        let status = TestStatus::ALL[(i % 4) as usize];
        let fields = TestFields {
            name: format!("Sample case {}", i + 1),
            status: Some(status),
            project_id: Some(Some(project_ids[(i % 3) as usize])),
            user_id: Some(Some(user_id)),
        };
        let when = now - Duration::days(10 * i);
        storage.create_test(&fields, when).await?;
        created += 1;
    }

    info!(projects = project_ids.len(), tests = created, "sample data inserted");
    Ok(())
}
