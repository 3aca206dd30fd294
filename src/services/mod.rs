pub mod seeder;
pub mod tenant_directory;

pub use seeder::{CompanyEmployees, Seeder};
pub use tenant_directory::TenantDirectory;
