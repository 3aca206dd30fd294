pub mod employee;
pub mod tenant;

pub use employee::{Employee, NewEmployee};
pub use tenant::{NewTenant, Tenant};
