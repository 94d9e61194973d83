use std::env;

use anyhow::{anyhow, bail, Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use fleetops::{
    auth::{is_valid_role, password::hash_password},
    config::AppConfig,
    db, init_tracing,
    models::NewUser,
    schema::users,
    state::AppState,
    sync::{load_targets, TriggerType, VehicleSyncer},
};

const USAGE: &str = "Usage:\n  admin create-user <email> <full-name> <role> <password>\n  admin sync-vehicles";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("create-user") => create_user(&args[1..])?,
        Some("sync-vehicles") => sync_vehicles().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn create_user(args: &[String]) -> Result<()> {
    let [email, full_name, role, password] = args else {
        bail!("create-user expects 4 arguments\n{USAGE}");
    };
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        bail!("'{email}' is not an email address");
    }
    if !is_valid_role(role) {
        bail!("role must be one of employee, manager, admin");
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "admin",
        database_url = %config.redacted_database_url(),
        "loaded fleetops configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        email,
        full_name: full_name.trim().to_string(),
        password_hash: hash_password(password)?,
        role: role.clone(),
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create user {}", new_user.email))?;

    println!("Created {} ({}) with id {}", new_user.email, new_user.role, new_user.id);
    Ok(())
}

async fn sync_vehicles() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "admin",
        database_url = %config.redacted_database_url(),
        mot_enabled = config.mot.is_some(),
        "loaded fleetops configuration"
    );
    let state = AppState::connect(config, 1).await?;
    let syncer = VehicleSyncer::from_state(&state).map_err(|err| anyhow!(err.to_string()))?;

    let targets = {
        let mut conn = state.db().map_err(|err| anyhow!(err.to_string()))?;
        load_targets(&mut conn, &[]).context("failed to load active vehicles")?
    };
    if targets.is_empty() {
        println!("No active vehicles.");
        return Ok(());
    }

    println!("Syncing {} vehicles…", targets.len());
    let report = syncer
        .sync_vehicles(&state, targets, TriggerType::Bulk, None)
        .await;
    for outcome in &report.results {
        match &outcome.error {
            None => println!(
                "✓ {} ({})",
                outcome.reg_number,
                outcome.fields_updated.join(", ")
            ),
            Some(error) => println!("✗ {}: {error}", outcome.reg_number),
        }
    }
    println!(
        "Done: {} succeeded, {} failed.",
        report.successful, report.failed
    );
    Ok(())
}
