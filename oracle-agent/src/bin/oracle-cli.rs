//! oracle-cli - command line client for the consultation ledger

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_chain::Reference;
use oracle_agent::{AgentConfig, HttpBackend, OracleAgentService};

/// Oracle ledger client
#[derive(Parser, Debug)]
#[command(name = "oracle-cli")]
#[command(about = "Ask the oracle, load and verify its audit ledger")]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "ORACLE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Base URL of the oracle service (overrides config)
    #[arg(long, env = "ORACLE_URL", global = true)]
    url: Option<String>,

    /// Directory for the local backup (overrides config)
    #[arg(long, env = "ORACLE_BACKUP_DIR", global = true)]
    backup_dir: Option<PathBuf>,

    /// Session identifier (overrides config)
    #[arg(long, env = "ORACLE_SESSION_ID", global = true)]
    session_id: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a question locally without sending it
    Score { question: String },
    /// Ask the oracle a question
    Ask { question: String },
    /// Load the ledger and print one page, newest first
    Chain {
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Verify a record hash locally and with the service
    Verify { hash: String },
    /// Check a reference hash against a JSON array of {title, url}
    VerifyRefs { ref_hash: String, references: String },
    /// Delete the local backup
    ResetBackup,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_path(path)?,
            None => AgentConfig::default(),
        };
        if let Some(url) = &self.url {
            config.backend.base_url = url.clone();
        }
        if let Some(dir) = &self.backup_dir {
            config.backup.directory = Some(dir.clone());
        }
        if let Some(session_id) = &self.session_id {
            config.general.session_id = session_id.clone();
        }
        config.general.log_level = self.log_level.clone();
        Ok(config)
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("oracle_agent={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.load_config()?;
    debug!(base_url = %config.backend.base_url, "Configuration loaded");

    let backend = Arc::new(HttpBackend::new(config.backend.base_url.clone())?);
    let service = OracleAgentService::new(config, backend)?;

    match args.command {
        Command::Score { question } => print_json(&service.assess(&question))?,
        Command::Ask { question } => print_json(&service.ask(&question).await?)?,
        Command::Chain { page } => {
            let loaded = service.load_chain().await?;
            if loaded.is_already_running() {
                return print_json(&loaded);
            }
            let view = service.view().await;
            info!(
                records = view.records.len(),
                degraded = view.degraded,
                valid = view.report.valid,
                "Ledger loaded"
            );
            print_json(&serde_json::json!({
                "degraded": view.degraded,
                "report": view.report,
                "rejected": view.rejected,
                "conflicts": view.conflicts,
                "collisions": view.collisions,
                "malformed": view.malformed,
                "remote_error": view.remote_error,
                "page": service.page(page).await,
            }))?;
        }
        Command::Verify { hash } => {
            service.load_chain().await?;
            print_json(&service.verify(&hash).await?)?;
        }
        Command::VerifyRefs { ref_hash, references } => {
            let references: Vec<Reference> = serde_json::from_str(&references)?;
            print_json(&service.verify_references(&ref_hash, &references).await?)?;
        }
        Command::ResetBackup => {
            service.reset_backup()?;
            info!("Local backup cleared");
        }
    }

    Ok(())
}
