//! MCP tool server giving read-only SQL access to a SQLite database.
//!
//! Usage: `sqldb-mcp [port]` (default 8089). The database is `SQLDB_PATH`
//! (default `data/system_logs.db`) and must exist.

use agentdesk::config::{load_dotenv, port_arg};
use agentdesk::event::LoggingEventHandler;
use agentdesk::mcp_server_builder::MCPServerBuilder;
use agentdesk::tools::SqlQueryProtocol;
use std::error::Error;
use std::sync::Arc;

const DEFAULT_PORT: u16 = 8089;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    load_dotenv();
    agentdesk::init_logger();

    let port = port_arg(std::env::args().nth(1), DEFAULT_PORT)?;
    let path = std::env::var("SQLDB_PATH").unwrap_or_else(|_| "data/system_logs.db".to_string());
    let sql = SqlQueryProtocol::open(&path).map_err(|e| {
        log::error!("cannot open {}: {}", path, e);
        e
    })?;

    let server = MCPServerBuilder::new()
        .with_name("sqldb")
        .with_event_handler(Arc::new(LoggingEventHandler))
        .with_protocol(Arc::new(sql))
        .await?
        .start_on(port)
        .await?;

    println!("{}", "*".repeat(50));
    println!("SQL MCP server for {} listening on {}", path, server.get_addr());
    println!("{}", "*".repeat(50));
    server.wait().await
}
