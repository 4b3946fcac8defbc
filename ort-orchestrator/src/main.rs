use crate::backend::authorization::InMemoryAuthorizationService;
use crate::backend::DefaultBackend;
use crate::config::ServerConfig;
use clap::{Args, Parser, Subcommand};
use futures_util::join;
use std::sync::Arc;

mod api;
mod backend;
mod config;
mod database;
mod logging;
mod metrics;
mod models;
mod orchestrator;
#[cfg(test)]
pub mod test_utils;

pub type Backend = Arc<DefaultBackend>;

#[derive(Parser, Debug)]
#[clap(author, about, version)]
pub struct Opts {
    #[clap(subcommand)]
    pub sub_command: MainOperation,

    #[clap(flatten)]
    pub logging_opts: logging::LoggingOpts,

    #[clap(flatten)]
    pub runtime_args: logging::RuntimeArgs,
}

#[derive(Subcommand, Debug)]
pub enum MainOperation {
    /// Run the orchestrator web server
    #[clap(name = "web-server")]
    RunWebServer(RunWebServerArgs),

    /// Run the DB Migration
    #[clap(name = "db-migrate")]
    DatabaseMigration(RunDatabaseMigrationsArgs),
}

#[derive(Args, Debug)]
pub struct RunWebServerArgs {
    /// Database Connection String
    #[clap(long = "database-url", env = "DATABASE_URL")]
    db_connection_string: String,

    /// TOML file with list and transport settings. Defaults apply when omitted.
    #[clap(long = "config", env = "ORCHESTRATOR_CONFIG")]
    config_file: Option<String>,

    /// Address to expose the main API on
    #[clap(long = "server-address", env = "SERVER_ADDRESS", default_value("127.0.0.1:3030"))]
    server_address: String,

    /// Address to expose metrics and status on
    #[clap(long = "admin-address", env = "ADMIN_ADDRESS", default_value("127.0.0.1:3031"))]
    admin_address: String,
}

#[derive(Args, Debug)]
pub struct RunDatabaseMigrationsArgs {
    /// Database Connection String
    #[clap(long = "database-url", env = "DATABASE_URL")]
    db_connection_string: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    human_panic::setup_panic!();
    dotenv::dotenv().ok();

    let opt = Opts::parse();

    logging::configure_logging(&opt.logging_opts, &opt.runtime_args)?;

    match opt.sub_command {
        MainOperation::RunWebServer(args) => run_webserver(args).await,
        MainOperation::DatabaseMigration(args) => run_db_migration(args).await,
    }
}

async fn run_db_migration(args: RunDatabaseMigrationsArgs) -> Result<(), anyhow::Error> {
    use sqlx::postgres::PgPoolOptions;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&args.db_connection_string)
        .await?;

    sqlx::migrate!().run(&pool).await?;

    Ok(())
}

async fn run_webserver(args: RunWebServerArgs) -> Result<(), anyhow::Error> {
    use std::net::SocketAddr;
    use warp::Filter;

    let config = ServerConfig::load(args.config_file.as_deref())?;

    let backend = Arc::new(
        DefaultBackend::new(
            args.db_connection_string,
            config,
            Arc::new(InMemoryAuthorizationService::default()),
        )
        .await?,
    );

    backend.orchestrator.recover_pending_jobs().await?;

    let filters = api::create_filters(backend).await;

    let api_addr: SocketAddr = args.server_address.parse()?;
    let api_server = warp::serve(filters).run(api_addr);

    let admin_server = warp::path("metrics")
        .map(api::metrics::metrics_endpoint)
        .or(warp::path("status").map(|| "OK"))
        .with(warp::trace::request());

    let admin_addr: SocketAddr = args.admin_address.parse()?;
    let admin_server = warp::serve(admin_server).run(admin_addr);

    let (_main, _admin) = join!(api_server, admin_server);

    Ok(())
}
