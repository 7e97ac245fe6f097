pub mod config;
pub mod error;
pub(crate) mod github;
pub mod state;
pub mod store;
