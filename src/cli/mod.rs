pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::AppState;
use crate::config::AppConfig;
use crate::database::{driver_from_config, ConnectionSupervisor};

#[derive(Parser)]
#[command(name = "tenantctl")]
#[command(about = "tenantctl - Seed and inspect tenant databases")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Populate fixture tenants and employees")]
    Seed {
        #[arg(value_enum, default_value_t = commands::seed::SeedTarget::All)]
        target: commands::seed::SeedTarget,
    },

    #[command(about = "Tenant directory operations")]
    Tenants {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Employee operations across company databases")]
    Employees {
        #[command(subcommand)]
        cmd: commands::employee::EmployeeCommands,
    },

    #[command(about = "Check storage connectivity")]
    Health,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Wire a supervisor, router and services from configuration
pub fn context(config: &AppConfig) -> AppState {
    let driver = driver_from_config(&config.database);
    let supervisor = Arc::new(ConnectionSupervisor::new(driver, config.database.connect_timeout()));
    AppState::new(supervisor)
}

pub async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    let result = match cli.command {
        Commands::Seed { target } => commands::seed::handle(target, &state, output_format).await,
        Commands::Tenants { cmd } => commands::tenant::handle(cmd, &state, output_format).await,
        Commands::Employees { cmd } => commands::employee::handle(cmd, &state, output_format).await,
        Commands::Health => commands::health::handle(&state, output_format).await,
    };

    state.supervisor.close().await;
    result
}
