//! Deployment sequence run by the `shop-deploy` binary.
//!
//! validate env -> connect -> migrate -> health check -> superuser bootstrap
//! -> notification. The first failing step aborts the run and is reported by
//! name.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use crate::auth::{hash_password, MIN_PASSWORD_LENGTH};
use crate::domain::aggregates::{normalize_email, User};
use crate::store::{NewUser, PgStore, Store};

pub const REQUIRED_VARS: [&str; 3] = ["DATABASE_URL", "SECRET_KEY", "ALLOWED_HOSTS"];
const SERVICE_NAME: &str = "shop-api";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    ValidateEnv,
    Connect,
    Migrate,
    HealthCheck,
    CreateSuperuser,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidateEnv => "validate-env",
            Self::Connect => "connect",
            Self::Migrate => "migrate",
            Self::HealthCheck => "health-check",
            Self::CreateSuperuser => "create-superuser",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("deployment failed at step {step}: {source}")]
    Step {
        step: Step,
        #[source]
        source: anyhow::Error,
    },
}

impl DeployError {
    pub fn step(&self) -> Step {
        match self {
            Self::MissingEnv(_) => Step::ValidateEnv,
            Self::Step { step, .. } => *step,
        }
    }

    fn at(step: Step, source: impl Into<anyhow::Error>) -> Self {
        Self::Step { step, source: source.into() }
    }
}

fn lookup_non_blank(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Every required variable that is unset or blank.
pub fn missing_vars(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    REQUIRED_VARS.iter().filter(|k| lookup_non_blank(&lookup, k).is_none()).map(|k| (*k).to_string()).collect()
}

#[derive(Clone)]
pub struct SuperuserCredentials {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

impl fmt::Debug for SuperuserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperuserCredentials")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl SuperuserCredentials {
    /// `None` unless all of `SUPERUSER_USERNAME`, `SUPERUSER_EMAIL` and `SUPERUSER_PASSWORD` are set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            username: lookup_non_blank(&lookup, "SUPERUSER_USERNAME")?,
            email: lookup_non_blank(&lookup, "SUPERUSER_EMAIL")?,
            password: SecretString::from(lookup_non_blank(&lookup, "SUPERUSER_PASSWORD")?),
        })
    }
}

/// Everything a deploy run needs, resolved from the environment up front.
#[derive(Debug)]
pub struct DeployPlan {
    pub database_url: SecretString,
    pub superuser: Option<SuperuserCredentials>,
    pub webhook_url: Option<String>,
}

impl DeployPlan {
    pub fn from_env() -> Result<Self, DeployError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DeployError> {
        let missing = missing_vars(&lookup);
        if !missing.is_empty() {
            return Err(DeployError::MissingEnv(missing));
        }
        Ok(Self {
            database_url: SecretString::from(lookup_non_blank(&lookup, "DATABASE_URL").unwrap_or_default()),
            superuser: SuperuserCredentials::from_lookup(&lookup),
            webhook_url: lookup_non_blank(&lookup, "DEPLOY_WEBHOOK_URL"),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SuperuserOutcome {
    Created(User),
    /// A user with the username or email already exists and was left untouched.
    Exists,
}

pub async fn create_superuser(store: &dyn Store, credentials: &SuperuserCredentials) -> anyhow::Result<SuperuserOutcome> {
    if store.user_by_username(&credentials.username).await?.is_some() || store.user_by_email(&credentials.email).await?.is_some() {
        return Ok(SuperuserOutcome::Exists);
    }
    let password = credentials.password.expose_secret();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        anyhow::bail!("superuser password must be at least {MIN_PASSWORD_LENGTH} characters");
    }
    let user = store
        .create_user(NewUser {
            username: credentials.username.clone(),
            email: normalize_email(&credentials.email),
            password_hash: hash_password(password)?,
            first_name: String::new(),
            last_name: String::new(),
            profile_picture_url: None,
            is_staff: true,
        })
        .await?;
    Ok(SuperuserOutcome::Created(user))
}

#[derive(Debug, Serialize)]
pub struct Notification {
    pub status: &'static str,
    pub service: &'static str,
    pub message: String,
}

/// POSTs the deployment result to `url`.
pub async fn notify(client: &reqwest::Client, url: &str, notification: &Notification) -> Result<(), reqwest::Error> {
    client.post(url).json(notification).send().await?.error_for_status()?;
    Ok(())
}

pub async fn migrate(database_url: &SecretString) -> Result<PgStore, DeployError> {
    tracing::info!(step = %Step::Connect, "Connecting to database");
    let store = PgStore::connect(database_url.expose_secret(), 2).await.map_err(|e| DeployError::at(Step::Connect, e))?;
    tracing::info!(step = %Step::Migrate, "Running migrations");
    store.migrate().await.map_err(|e| DeployError::at(Step::Migrate, e))?;
    Ok(store)
}

/// Full deployment against the configured database.
pub async fn run(plan: &DeployPlan) -> Result<(), DeployError> {
    let store = migrate(&plan.database_url).await?;
    finish(&store, plan, &reqwest::Client::new()).await
}

/// Steps after migration: health check, superuser bootstrap, notification.
pub async fn finish(store: &dyn Store, plan: &DeployPlan, client: &reqwest::Client) -> Result<(), DeployError> {
    tracing::info!(step = %Step::HealthCheck, "Checking database health");
    store.ping().await.map_err(|e| DeployError::at(Step::HealthCheck, e))?;

    match &plan.superuser {
        Some(credentials) => match create_superuser(store, credentials).await.map_err(|e| DeployError::at(Step::CreateSuperuser, e))? {
            SuperuserOutcome::Created(user) => tracing::info!(username = %user.username, "Superuser created"),
            SuperuserOutcome::Exists => tracing::info!(username = %credentials.username, "Superuser already exists, skipping"),
        },
        None => tracing::info!("Superuser credentials not set, skipping superuser creation"),
    }

    if let Some(url) = &plan.webhook_url {
        let notification = Notification { status: "success", service: SERVICE_NAME, message: "Deployment completed successfully".into() };
        match notify(client, url, &notification).await {
            Ok(()) => tracing::info!("Deployment notification sent"),
            Err(e) => tracing::warn!(error = %e, "Failed to send deployment notification"),
        }
    }
    tracing::info!("Deployment completed successfully");
    Ok(())
}
