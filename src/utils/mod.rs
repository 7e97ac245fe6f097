pub(crate) mod auth;
pub(crate) mod encode;
pub(crate) mod jwt;
pub mod pkce;
