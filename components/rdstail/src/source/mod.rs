#[cfg(test)]
pub mod fake;
pub mod models;
pub mod rds;
pub mod source;
