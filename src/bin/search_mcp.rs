//! MCP tool server for Azure AI Search, plus the FAQ tools when embeddings are configured.
//!
//! Usage: `search-mcp [port]` (default 8088). Reads `AZURE_SEARCH_ENDPOINT`,
//! `AZURE_SEARCH_API_KEY` and `AZURE_SEARCH_INDEX`; the FAQ tools additionally need
//! `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_KEY` and `EMBEDDING_DEPLOYMENT_NAME`.

use agentdesk::clients::azure_openai::AzureOpenAIEmbedder;
use agentdesk::config::{load_dotenv, port_arg};
use agentdesk::event::LoggingEventHandler;
use agentdesk::faq_memory::FaqMemory;
use agentdesk::faq_protocol::FaqProtocol;
use agentdesk::mcp_server_builder::MCPServerBuilder;
use agentdesk::tools::{AiSearchConfig, AiSearchProtocol};
use std::error::Error;
use std::sync::Arc;

const DEFAULT_PORT: u16 = 8088;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    load_dotenv();
    agentdesk::init_logger();

    let port = port_arg(std::env::args().nth(1), DEFAULT_PORT)?;
    let search = AiSearchConfig::from_env();
    if !search.is_complete() {
        log::warn!("Azure AI Search is not fully configured; search_documents will report it");
    }

    let mut builder = MCPServerBuilder::new()
        .with_name("search")
        .with_event_handler(Arc::new(LoggingEventHandler))
        .with_protocol(Arc::new(AiSearchProtocol::new(search)))
        .await?
        .with_prompt(AiSearchProtocol::search_prompt())
        .await;

    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    if let (Some(endpoint), Some(key), Some(deployment)) = (
        env("AZURE_OPENAI_ENDPOINT"),
        env("AZURE_OPENAI_API_KEY"),
        env("EMBEDDING_DEPLOYMENT_NAME"),
    ) {
        let path = env("FAQ_DATA_PATH").unwrap_or_else(|| "data/faq-qna-items.json".to_string());
        let embedder = Arc::new(AzureOpenAIEmbedder::new(&endpoint, &key, &deployment));
        let memory = FaqMemory::shared(&path, embedder)?;
        log::info!("serving FAQ tools over {} records from {}", memory.record_count(), path);
        builder = builder
            .with_protocol(Arc::new(FaqProtocol::new(memory)))
            .await?;
    }

    let server = builder.start_on(port).await?;
    println!("{}", "*".repeat(50));
    println!("Search MCP server listening on {}", server.get_addr());
    println!("{}", "*".repeat(50));
    server.wait().await
}
