use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cohort::api::{self, SecurityConfig};
use cohort::client::ApiClient;
use cohort::config::ServerConfig;
use cohort::db::{self, Database};
use cohort::models::DbId;
use cohort::workflow::{Reconciler, Workflow};

#[derive(Parser)]
#[command(name = "cohort")]
#[command(about = "Intern, project and task tracking with automatic project completion")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Cohort server
    Serve {
        /// Port for HTTP API (overrides COHORT_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database file (overrides COHORT_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Run one completion pass against the local database and exit
    Reconcile {
        /// Database file (overrides COHORT_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Check server status
    Status,
    /// Print a project's history
    History {
        /// Project id
        project_id: DbId,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "cohort=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let path = match path {
        Some(path) => path,
        None => db::default_path()?,
    };
    tracing::info!("Using database at {}", path.display());
    let db = Database::open(path)?;
    db.migrate()?;
    Ok(db)
}

async fn serve(
    mut config: ServerConfig,
    port: Option<u16>,
    db: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    if db.is_some() {
        config.db_path = db;
    }

    let workflow = Workflow::new(open_database(config.db_path.clone())?);
    let reconciler = config
        .reconcile_interval()
        .map(|interval| Reconciler::spawn(workflow.clone(), interval));
    if reconciler.is_none() {
        tracing::info!("Periodic reconciliation disabled");
    }

    let app = api::create_router_with_security(workflow, SecurityConfig::from_env());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Cohort server listening on http://{}", config.bind_addr());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    if let Some(reconciler) = reconciler {
        reconciler.shutdown().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ServerConfig::from_env()?;

    match cli.command {
        Some(Commands::Serve { port, db }) => serve(config, port, db).await?,
        None => serve(config, None, None).await?,
        Some(Commands::Reconcile { db }) => {
            let workflow = Workflow::new(open_database(db.or(config.db_path))?);
            let report = workflow.reconcile().await?;
            if report.is_noop() {
                println!("Nothing to complete.");
            }
            for done in &report.completed {
                println!(
                    "Completed project {} (released interns: {:?})",
                    done.project_id, done.released
                );
            }
            for failure in &report.failures {
                eprintln!("Project {}: {}", failure.project_id, failure.error);
            }
        }
        Some(Commands::Status) => {
            let client = ApiClient::from_env();
            match client.health().await {
                Ok(()) => println!("Cohort server is running."),
                Err(e) => {
                    eprintln!("Cohort server is not reachable: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::History { project_id }) => {
            let client = ApiClient::from_env();
            let project = client.get_project(project_id).await?;
            let history = client.project_history(project_id).await?;
            println!("{} [{}]", project.name, project.status.label());
            if history.is_empty() {
                println!("  (no history)");
            }
            for item in history {
                println!(
                    "  {}  {}",
                    item.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    item.event.describe()
                );
            }
        }
    }

    Ok(())
}
