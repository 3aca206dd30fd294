use clap::Subcommand;

use crate::api::AppState;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List all tenants")]
    List,
}

pub async fn handle(cmd: TenantCommands, state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::List => {
            let tenants = state.directory.list_tenants().await?;

            if tenants.is_empty() {
                return output_empty_collection(&output_format, "tenants", "No tenants found");
            }

            match output_format {
                OutputFormat::Json => output_collection("tenants", &tenants)?,
                OutputFormat::Text => {
                    println!("{:<15} {:<20} {:<10} {:<30} {}", "SLUG", "COMPANY", "OWNER", "EMAIL", "CREATED");
                    println!("{}", "-".repeat(95));

                    for tenant in &tenants {
                        println!(
                            "{:<15} {:<20} {:<10} {:<30} {}",
                            tenant.company_slug,
                            tenant.company_name,
                            tenant.name,
                            tenant.email,
                            tenant.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }

            Ok(())
        }
    }
}
