pub(crate) mod note;
pub(crate) mod oauth;
pub(crate) mod request;
pub(crate) mod response;
pub mod user;
