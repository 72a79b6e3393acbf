//! MCP tool server exposing the host's local time.
//!
//! Usage: `localtime-mcp [port]` (default 8087).

use agentdesk::config::{load_dotenv, port_arg};
use agentdesk::event::LoggingEventHandler;
use agentdesk::mcp_server_builder::MCPServerBuilder;
use agentdesk::tools::LocalTimeProtocol;
use std::error::Error;
use std::sync::Arc;

const DEFAULT_PORT: u16 = 8087;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    load_dotenv();
    agentdesk::init_logger();

    let port = port_arg(std::env::args().nth(1), DEFAULT_PORT)?;
    let server = MCPServerBuilder::new()
        .with_name("localtime")
        .with_event_handler(Arc::new(LoggingEventHandler))
        .with_protocol(Arc::new(LocalTimeProtocol::new()))
        .await?
        .start_on(port)
        .await?;

    println!("{}", "*".repeat(50));
    println!("LocalTime MCP server listening on {}", server.get_addr());
    println!("{}", "*".repeat(50));
    server.wait().await
}
