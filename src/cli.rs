//! CLI Tooling
//!
//! Command definitions for the `warden` binary and their execution against a
//! loaded configuration.

use crate::config::{ConfigLoader, WardenConfig};
use crate::directory::ResourceDirectory;
use crate::error::WardenError;
use crate::models::FileModelLoader;
use crate::spawner::{admissible, AgentSpawner, SysinfoMemory, SystemMemory};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Warden - admission control and lifecycle management for agent swarms
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Admit, supervise and scale a swarm of in-process agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Spawn agents and supervise them until Ctrl-C
    Run {
        /// Agents to request; admission control may allow fewer
        #[arg(long, default_value = "100")]
        agents: usize,
        /// Agent type tag (defaults to spawner.default_agent_type)
        #[arg(long)]
        agent_type: Option<String>,
        /// Seconds between status snapshots in the log
        #[arg(long, default_value = "10")]
        status_interval_secs: u64,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Publish each stdin line (JSON, or plain text) to the event stream
        #[arg(long)]
        feed: bool,
    },
    /// Print the effective configuration as TOML
    Config,
    /// Show how many agents admission control allows on this host
    Admit {
        /// Agents to request
        #[arg(long, default_value = "1000000")]
        count: usize,
    },
}

/// Loaded configuration plus command execution
pub struct CliContext {
    config: WardenConfig,
}

impl CliContext {
    pub fn new(config_path: Option<&Path>) -> Result<Self, WardenError> {
        Ok(Self {
            config: ConfigLoader::load(config_path)?,
        })
    }

    pub fn from_config(config: WardenConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Apply `--log-*` flags over the loaded logging section
    pub fn apply_log_overrides(&mut self, cli: &Cli) {
        let logging = &mut self.config.logging;
        if let Some(level) = &cli.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            logging.file = Some(file.clone());
        }
    }

    pub async fn execute(&self, command: &Commands) -> anyhow::Result<String> {
        match command {
            Commands::Run {
                agents,
                agent_type,
                status_interval_secs,
                duration_secs,
                feed,
            } => {
                let agent_type = agent_type
                    .clone()
                    .unwrap_or_else(|| self.config.spawner.default_agent_type.clone());
                let duration = duration_secs.map(Duration::from_secs);
                let shutdown = async move {
                    match duration {
                        Some(d) => tokio::time::sleep(d).await,
                        None => {
                            if let Err(e) = tokio::signal::ctrl_c().await {
                                warn!(error = %e, "Failed to listen for Ctrl-C");
                                std::future::pending::<()>().await;
                            }
                        }
                    }
                };
                self.run(
                    *agents,
                    &agent_type,
                    Duration::from_secs((*status_interval_secs).max(1)),
                    *feed,
                    shutdown,
                )
                .await
            }
            Commands::Config => Ok(ConfigLoader::to_toml_string(&self.config)?),
            Commands::Admit { count } => {
                let memory = SysinfoMemory::new();
                let available = memory.available_bytes();
                let spawner = &self.config.spawner;
                let admitted = admissible(
                    *count,
                    available,
                    spawner.admission_fraction,
                    spawner.per_agent_memory_bytes,
                );
                Ok(serde_json::to_string_pretty(&json!({
                    "requested": count,
                    "available_bytes": available,
                    "utilization_pct": memory.utilization_pct(),
                    "admission_fraction": spawner.admission_fraction,
                    "per_agent_memory_bytes": spawner.per_agent_memory_bytes,
                    "admitted": admitted.min(spawner.max_agents),
                }))?)
            }
        }
    }

    /// Spawn, supervise until `shutdown` resolves, then tear everything down
    pub async fn run<F>(
        &self,
        agents: usize,
        agent_type: &str,
        status_interval: Duration,
        feed: bool,
        shutdown: F,
    ) -> anyhow::Result<String>
    where
        F: Future<Output = ()>,
    {
        let loader = Arc::new(FileModelLoader::new(
            self.config.models.directory.clone(),
            self.config.models.extension.clone(),
        ));
        let directory = Arc::new(ResourceDirectory::from_config(&self.config, loader));
        let spawner = Arc::new(AgentSpawner::from_config(
            &self.config,
            Arc::clone(&directory),
            Arc::new(SysinfoMemory::new()),
        ));

        let spawned = spawner.spawn_agents(agents, agent_type).await;
        spawner.start_monitor();

        let feeder = feed.then(|| tokio::spawn(feed_stdin(Arc::clone(&directory))));

        let mut ticker = tokio::time::interval(status_interval);
        ticker.tick().await;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let snapshot = spawner.snapshot();
                    info!(
                        agents = snapshot.agent_count,
                        active_trades = snapshot.active_trades,
                        pool_utilization = snapshot.pool_utilization_pct,
                        system_utilization = snapshot.system_utilization_pct,
                        restarts = snapshot.restarts_total,
                        evicted = snapshot.evicted_total,
                        "Swarm status"
                    );
                }
            }
        }

        info!("Shutting down");
        if let Some(feeder) = feeder {
            feeder.abort();
        }
        spawner.shutdown().await;

        Ok(serde_json::to_string_pretty(&json!({
            "spawn": spawned,
            "final": spawner.snapshot(),
        }))?)
    }
}

/// Publish stdin lines until EOF
async fn feed_stdin(directory: Arc<ResourceDirectory>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let payload = serde_json::from_str(line)
                    .unwrap_or_else(|_| serde_json::Value::String(line.to_string()));
                directory.publish(payload);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin feed");
                break;
            }
        }
    }
    info!("Stdin feed closed");
}
