pub mod activity;
pub mod auth;
pub mod config;
pub mod logging;
pub mod status;
pub mod supervisor;
pub mod transport;
