use clap::Subcommand;

use crate::api::AppState;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::services::CompanyEmployees;

#[derive(Subcommand)]
pub enum EmployeeCommands {
    #[command(about = "List employees of every company, or of one tenant")]
    List {
        #[arg(long, help = "Company slug of the tenant")]
        tenant: Option<String>,
    },
}

pub async fn handle(cmd: EmployeeCommands, state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        EmployeeCommands::List { tenant } => {
            let companies = match tenant {
                Some(slug) => {
                    let tenant = state.directory.get_tenant(&slug).await?;
                    let employees = state.directory.list_employees(&tenant).await?;
                    vec![CompanyEmployees {
                        company_slug: tenant.company_slug,
                        employees,
                    }]
                }
                None => state.seeder.list_all_employees().await?,
            };

            if companies.iter().all(|c| c.employees.is_empty()) {
                return output_empty_collection(&output_format, "companies", "No employees found");
            }

            match output_format {
                OutputFormat::Json => output_collection("companies", &companies)?,
                OutputFormat::Text => {
                    println!("{:<15} {:<12} {:<20} {}", "COMPANY", "EMPLOYEE ID", "NAME", "CREATED");
                    println!("{}", "-".repeat(70));

                    for company in &companies {
                        for employee in &company.employees {
                            println!(
                                "{:<15} {:<12} {:<20} {}",
                                company.company_slug,
                                employee.employee_id,
                                employee.name,
                                employee.created_at.format("%Y-%m-%d %H:%M")
                            );
                        }
                    }
                }
            }

            Ok(())
        }
    }
}
