pub mod config;
pub mod domain;
pub mod email_client;
pub mod repository;
pub mod routes;
pub mod services;
pub mod startup;
pub mod telemetry;

#[cfg(test)]
pub mod test_support;
