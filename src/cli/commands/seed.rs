use clap::ValueEnum;
use serde_json::json;

use crate::api::AppState;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeedTarget {
    Tenants,
    Employees,
    All,
}

pub async fn handle(target: SeedTarget, state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match target {
        SeedTarget::Tenants => {
            let tenants = state.seeder.seed_tenants().await?;
            output_success(
                &output_format,
                &format!("Seeded {} tenants", tenants.len()),
                Some(json!({ "tenants": tenants })),
            )
        }
        SeedTarget::Employees => {
            let employees = state.seeder.seed_employees().await?;
            output_success(
                &output_format,
                &format!("Seeded {} employees", employees.len()),
                Some(json!({ "employees": employees })),
            )
        }
        SeedTarget::All => {
            state.seeder.initialize().await?;
            let tenants = state.directory.list_tenants().await?;
            output_success(
                &output_format,
                &format!("Seeded {} tenants with one employee each", tenants.len()),
                Some(json!({ "tenants": tenants })),
            )
        }
    }
}
