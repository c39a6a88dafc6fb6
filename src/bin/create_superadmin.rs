//! Bootstrap the first superadmin account.
//!
//! Reads connection settings from the same environment as the server.

use clap::Parser;
use hewal_api::{
    auth::validate_password_strength,
    models::{Admin, NewAdmin},
    AppState, Config,
};

#[derive(Parser, Debug)]
#[command(name = "create-superadmin", version, about = "Create a Hewal superadmin account")]
struct Args {
    /// Login email for the new admin
    #[arg(long, env = "SUPERADMIN_EMAIL")]
    email: String,

    /// Initial password
    #[arg(long, env = "SUPERADMIN_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, env = "SUPERADMIN_NAME", default_value = "Super Admin")]
    full_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hewal_api=info".into()),
        )
        .init();

    let args = Args::parse();
    let email = args.email.trim().to_lowercase();
    if !email.contains('@') {
        anyhow::bail!("'{}' is not a valid email address", email);
    }
    validate_password_strength(&args.password).map_err(anyhow::Error::msg)?;

    let state = AppState::new(Config::from_env()?)?;
    let db = &state.db;

    let existing: Option<Admin> = db
        .fetch_optional(db.table("admins").select("*").eq("email", &email))
        .await?;
    if existing.is_some() {
        anyhow::bail!("An admin with email {} already exists", email);
    }

    let admin: Admin = db
        .insert(
            "admins",
            &NewAdmin {
                email,
                hashed_password: state.auth_service.hash_password(&args.password)?,
                full_name: args.full_name,
                is_superadmin: true,
            },
        )
        .await?;

    tracing::info!(admin_id = admin.id, email = %admin.email, "Superadmin created");
    println!("Superadmin {} created (id {})", admin.email, admin.id);
    Ok(())
}
