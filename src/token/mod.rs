pub(crate) mod sqlite;
pub(crate) mod store;

pub(crate) use sqlite::SqliteOAuthStore;
