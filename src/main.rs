use std::sync::Arc;

use clap::{Parser, Subcommand};
use diesel::{Connection, PgConnection};
use hostel_admin::config::Config;
use hostel_admin::seed::{provision, AdminSeed};
use hostel_admin::{app, lazy_pool, load_enforcer, run_migrations, Keys, State};
use tokio::net::TcpListener;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Hostel room booking administration")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations and serve HTTP (default)
    Serve,
    /// Run migrations, create the admin account and sample rooms
    InitDb {
        #[arg(long, default_value = "admin@hostel.com")]
        admin_email: String,
        #[arg(long, default_value = "Admin User")]
        admin_name: String,
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_filter(filter),
        )
        .init();

    let config = Config::from_env()?;

    let mut migration_connection = PgConnection::establish(&config.database_url)?;
    run_migrations(&mut migration_connection).map_err(|e| e as Box<dyn std::error::Error>)?;
    drop(migration_connection);
    info!("Migrations applied");

    // set up connection pool
    let pool = lazy_pool(config.database_url.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::InitDb {
            admin_email,
            admin_name,
            admin_password,
        } => {
            let mut conn = pool.get().await?;
            let report = provision(
                &mut conn,
                &AdminSeed {
                    name: admin_name,
                    email: admin_email,
                    password: admin_password,
                },
            )
            .await?;
            info!(
                admin_created = report.admin_created,
                rooms_created = report.rooms_created,
                "Database initialised"
            );
            Ok(())
        }
        Command::Serve => {
            let acl_model = config.acl_model.clone().leak();
            let acl_policy = config.acl_policy.clone().leak();
            let state = State {
                pool,
                enforcer: Arc::new(load_enforcer(acl_model, acl_policy).await?),
                keys: Arc::new(Keys::new(&config.session_key)),
                session_ttl: config.session_ttl,
            };

            let listener = TcpListener::bind(config.listen_addr).await?;
            info!("Listening on {}", config.listen_addr);
            Ok(axum::serve(listener, app(state)).await?)
        }
    }
}
