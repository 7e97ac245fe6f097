pub(crate) mod server;
pub(crate) mod sse;
pub mod types;

pub(crate) use server::{McpContext, McpServer};
pub(crate) use sse::SseSessions;
