pub mod accounts;
pub mod audit;
pub mod auth;
pub mod configuration;
pub mod confirmation_token;
pub mod cookies;
pub mod email_client;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod validators;
