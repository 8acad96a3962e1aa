mod http;
mod mcp;

pub use http::{http_router, serve_http};
pub use mcp::McpServer;
