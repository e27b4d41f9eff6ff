//! noctua command line: run the gateway, chat locally, manage the vault.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use noctua::{Runtime, RuntimeConfig, Vault};

#[derive(Parser)]
#[command(name = "noctua", about = "Self-evolving multi-channel agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the WebSocket gateway with the agent, mind, and goal runner.
    Gateway {
        /// Bind address; defaults to NOCTUA_GATEWAY_ADDR.
        #[arg(long)]
        addr: Option<String>,
        /// Exit after the first adapter disconnects (used by tests).
        #[arg(long)]
        once: bool,
    },
    /// One-shot local chat turn, no gateway involved.
    Chat {
        message: String,
    },
    /// Print the runtime status snapshot.
    Status,
    /// Manage the encrypted vault.
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Create a new vault (overwrites an existing one).
    Init {
        #[arg(long, env = "NOCTUA_VAULT_PASSWORD")]
        password: String,
    },
    /// Store a JSON value under a key.
    Set {
        key: String,
        /// JSON payload, e.g. '{"email": "me@example.com"}'.
        value: String,
        #[arg(long, env = "NOCTUA_VAULT_PASSWORD")]
        password: String,
    },
    Get {
        key: String,
        #[arg(long, env = "NOCTUA_VAULT_PASSWORD")]
        password: String,
    },
    List {
        #[arg(long, env = "NOCTUA_VAULT_PASSWORD")]
        password: String,
    },
    Delete {
        key: String,
        #[arg(long, env = "NOCTUA_VAULT_PASSWORD")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    config::load_and_apply("noctua", None).context("load config layers")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime_config = RuntimeConfig::from_env();

    match cli.command {
        Command::Gateway { addr, once } => {
            let runtime = Runtime::boot(runtime_config)
                .await
                .map_err(|e| anyhow::anyhow!("boot: {}", e))?;
            gateway::run_gateway(runtime, addr.as_deref(), once)
                .await
                .map_err(|e| anyhow::anyhow!("gateway: {}", e))?;
        }
        Command::Chat { message } => {
            let runtime = Runtime::boot(runtime_config)
                .await
                .map_err(|e| anyhow::anyhow!("boot: {}", e))?;
            let (_, reply) = runtime
                .handle_chat(&message, "", "cli", "local")
                .await
                .map_err(|e| anyhow::anyhow!("chat: {}", e))?;
            println!("{}", reply);
            runtime.shutdown();
        }
        Command::Status => {
            let runtime = Runtime::boot(runtime_config)
                .await
                .map_err(|e| anyhow::anyhow!("boot: {}", e))?;
            println!("{}", serde_json::to_string_pretty(&runtime.status_snapshot())?);
            runtime.shutdown();
        }
        Command::Vault { action } => run_vault(&runtime_config, action)?,
    }

    Ok(())
}

fn run_vault(config: &RuntimeConfig, action: VaultAction) -> Result<()> {
    let dir = &config.project_dir;
    match action {
        VaultAction::Init { password } => {
            Vault::create(dir, &password).map_err(|e| anyhow::anyhow!("{}", e))?;
            println!("vault created at {}", dir.display());
        }
        VaultAction::Set {
            key,
            value,
            password,
        } => {
            let vault = unlock(dir, &password)?;
            let value: serde_json::Value =
                serde_json::from_str(&value).context("value must be JSON")?;
            vault.set(&key, value).map_err(|e| anyhow::anyhow!("{}", e))?;
            println!("stored '{}'", key);
        }
        VaultAction::Get { key, password } => {
            let vault = unlock(dir, &password)?;
            match vault.get(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => bail!("no vault entry for '{}'", key),
            }
        }
        VaultAction::List { password } => {
            let vault = unlock(dir, &password)?;
            for key in vault.list_keys() {
                println!("{}", key);
            }
        }
        VaultAction::Delete { key, password } => {
            let vault = unlock(dir, &password)?;
            if vault.delete(&key).map_err(|e| anyhow::anyhow!("{}", e))? {
                println!("deleted '{}'", key);
            } else {
                bail!("no vault entry for '{}'", key);
            }
        }
    }
    Ok(())
}

fn unlock(dir: &std::path::Path, password: &str) -> Result<Vault> {
    Vault::unlock(dir, password).map_err(|e| anyhow::anyhow!("{}", e))
}
