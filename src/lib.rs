// Library exports so integration tests can drive the engine directly.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod mailer;
pub mod routes;
pub mod state;
