//! Tool implementations served by the standalone MCP servers.

pub mod ai_search;
pub mod local_time;
pub mod sql_query;

pub use ai_search::{AiSearchConfig, AiSearchProtocol};
pub use local_time::LocalTimeProtocol;
pub use sql_query::SqlQueryProtocol;
