use std::net::SocketAddr;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quill::auth::forms::RegisterForm;
use quill::auth::password::hash_password;
use quill::auth::repository::NewUser;
use quill::config::{Cli, Command, Config};
use quill::state::AppState;
use quill::{db, mail, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let mailer = mail::build_mailer(&config.email).context("Failed to set up mail transport")?;
    let state = AppState::new(pool, config.clone(), mailer);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state, &config).await,
        Command::CreateSuperuser {
            username,
            email,
            password,
        } => create_superuser(&state, username, email, password).await,
    }
}

async fn serve(state: AppState, config: &Config) -> anyhow::Result<()> {
    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Insert an active superuser, checked by the same rules as the signup form.
async fn create_superuser(
    state: &AppState,
    username: String,
    email: String,
    password: String,
) -> anyhow::Result<()> {
    let form = RegisterForm {
        username,
        email,
        password1: password.clone(),
        password2: password,
    };
    let registration = form.clean().map_err(|errors| {
        let problems: Vec<String> = ["username", "email", "password1"]
            .iter()
            .flat_map(|field| {
                errors
                    .for_field(field)
                    .into_iter()
                    .map(move |msg| format!("{field}: {msg}"))
            })
            .collect();
        anyhow::anyhow!("Invalid superuser details: {}", problems.join("; "))
    })?;

    let password_hash = hash_password(registration.password, state.config.auth.bcrypt_cost)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let user = state
        .accounts
        .create_user(
            &NewUser {
                username: registration.username,
                email: registration.email,
                password_hash,
                is_active: true,
                is_superuser: true,
            },
            Utc::now().naive_utc(),
        )
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "Superuser created");
    Ok(())
}
