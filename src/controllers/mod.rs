pub(crate) mod note;
pub(crate) mod token;
pub(crate) mod user;
