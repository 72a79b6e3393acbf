//! Console chat against the backend.
//!
//! Usage: `agentdesk-chat [backend-url]` (default `http://localhost:8091`).
//! `/reset` starts a new conversation, `/quit` exits.

use agentdesk::chat_client::ChatSession;
use agentdesk::config::load_dotenv;
use std::error::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const DEFAULT_BACKEND: &str = "http://localhost:8091";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    load_dotenv();
    agentdesk::init_logger();

    let backend = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AGENTDESK_BACKEND_URL").ok())
        .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
    let mut session = ChatSession::new(&backend);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Welcome! I am an AI assistant backed by hosted agents and MCP tools. How can I help you?");
    println!("(/reset starts over, /quit exits)");

    loop {
        stdout.write_all(b"\nyou> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                match session.reset().await {
                    Ok(true) => println!("Previous agent and thread resources have been deleted."),
                    Ok(false) => {}
                    Err(e) => println!("Note: Could not delete previous session resources: {}", e),
                }
                println!("Started a new conversation. Previous session has been reset.");
            }
            message => match session.send(message).await {
                Ok(reply) => println!("assistant> {}", reply),
                Err(e) => {
                    log::error!("{}", e);
                    println!("assistant> {}", e);
                }
            },
        }
    }
    Ok(())
}
