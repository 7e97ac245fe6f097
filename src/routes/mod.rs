pub(crate) mod auth;
pub(crate) mod mcp;
pub(crate) mod notes;
pub(crate) mod oauth;
pub(crate) mod pages;
pub mod router;
