pub mod employee;
pub mod health;
pub mod seed;
pub mod tenant;
