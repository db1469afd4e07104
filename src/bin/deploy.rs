//! shop-deploy - deployment tasks for the shop API

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shop_api::deploy::{self, DeployError, DeployPlan, Step, SuperuserCredentials, SuperuserOutcome};

#[derive(Parser)]
#[command(name = "shop-deploy", version, about = "Deployment tasks for the shop API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate env, migrate, health check, bootstrap superuser, notify (default)
    Deploy,
    /// Run database migrations only
    Migrate,
    /// Create a staff user
    CreateSuperuser {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "shop_api=info,shop_deploy=info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Deploy) {
        Command::Deploy => deploy_all().await,
        Command::Migrate => migrate_only().await,
        Command::CreateSuperuser { username, email, password } => {
            create_superuser(SuperuserCredentials { username, email, password: SecretString::from(password) }).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(step = %e.step(), "{e}");
            ExitCode::FAILURE
        }
    }
}

async fn deploy_all() -> Result<(), DeployError> {
    tracing::info!("Starting deployment");
    let plan = DeployPlan::from_env()?;
    deploy::run(&plan).await
}

async fn migrate_only() -> Result<(), DeployError> {
    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DeployError::MissingEnv(vec!["DATABASE_URL".into()]))?;
    deploy::migrate(&SecretString::from(database_url)).await?;
    tracing::info!("Migrations applied");
    Ok(())
}

async fn create_superuser(credentials: SuperuserCredentials) -> Result<(), DeployError> {
    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DeployError::MissingEnv(vec!["DATABASE_URL".into()]))?;
    let store = deploy::migrate(&SecretString::from(database_url)).await?;
    match deploy::create_superuser(&store, &credentials)
        .await
        .map_err(|source| DeployError::Step { step: Step::CreateSuperuser, source })?
    {
        SuperuserOutcome::Created(user) => tracing::info!(username = %user.username, "Superuser created"),
        SuperuserOutcome::Exists => tracing::warn!(username = %credentials.username, "A user with that username or email already exists"),
    }
    Ok(())
}
