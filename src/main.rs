use std::{path::PathBuf, process, sync::Arc};

use clap::{Args, Parser, Subcommand};
use sea_orm::{Database, DatabaseConnection};
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront::api::create_api_router;
use storefront::config::AppConfig;
use storefront::entities::setup_schema;
use storefront::integrations::{GoogleVerifier, LogMailer, RazorpayGateway};
use storefront::services::{accounts, import};
use storefront::AppState;

#[derive(Debug, Parser)]
#[command(name = "storefront", about = "Storefront backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Upsert categories and products from a JSON catalog file
    Import(ImportArgs),
    /// Create an administrator, or promote an existing account
    CreateAdmin(CreateAdminArgs),
}

#[derive(Debug, Args)]
struct ImportArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct CreateAdminArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "ADMIN_PASSWORD")]
    password: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        eprintln!("{error}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = AppConfig::from_env().map_err(|error| format!("invalid configuration: {error}"))?;
    let db = connect(&config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, db).await,
        Commands::Import(args) => {
            let raw = tokio::fs::read_to_string(&args.file)
                .await
                .map_err(|error| format!("failed to read {}: {error}", args.file.display()))?;
            let file = import::parse_catalog(&raw).map_err(|error| error.to_string())?;
            let report = import::import_catalog(&db, file)
                .await
                .map_err(|error| format!("import failed: {error}"))?;
            println!("categories_created: {}", report.categories_created);
            println!("products_created: {}", report.products_created);
            println!("products_updated: {}", report.products_updated);
            Ok(())
        }
        Commands::CreateAdmin(args) => {
            let admin = accounts::create_admin(&db, &args.email, &args.password)
                .await
                .map_err(|error| format!("failed to create admin: {error}"))?;
            println!("admin_id: {}", admin.id);
            println!("admin_email: {}", admin.email);
            Ok(())
        }
    }
}

async fn connect(config: &AppConfig) -> Result<DatabaseConnection, String> {
    let db = Database::connect(&config.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;
    setup_schema(&db)
        .await
        .map_err(|error| format!("failed to set up schema: {error}"))?;
    Ok(db)
}

async fn serve(config: AppConfig, db: DatabaseConnection) -> Result<(), String> {
    let gateway = RazorpayGateway::new(config.gateway.clone())
        .map_err(|error| format!("failed to build gateway client: {error}"))?;
    let identity = GoogleVerifier::new(config.google_client_id.clone(), config.gateway.timeout)
        .map_err(|error| format!("failed to build identity client: {error}"))?;

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        db: Arc::new(db),
        config: Arc::new(config),
        gateway: Arc::new(gateway),
        mailer: Arc::new(LogMailer),
        identity: Arc::new(identity),
    };
    let app = create_api_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|error| format!("failed to bind {bind_addr}: {error}"))?;
    info!(addr = %bind_addr, "Listening");
    axum::serve(listener, app)
        .await
        .map_err(|error| format!("server error: {error}"))
}
