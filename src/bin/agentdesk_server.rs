//! Chat backend. Configuration comes from the environment (and `.env`); see
//! [`agentdesk::config::AgentDeskConfig`].

use agentdesk::clients::azure_agents::AzureAgentsClient;
use agentdesk::clients::azure_openai::AzureOpenAIEmbedder;
use agentdesk::clients::credentials::{AzureCliCredential, CredentialProvider, StaticToken};
use agentdesk::config::{load_dotenv, AgentDeskConfig, ServerMode};
use agentdesk::event::LoggingEventHandler;
use agentdesk::faq_memory::FaqMemory;
use agentdesk::server::{serve, AppState};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    load_dotenv();
    agentdesk::init_logger();

    let config = AgentDeskConfig::from_env()?;
    let credential: Arc<dyn CredentialProvider> = match &config.agent_token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(AzureCliCredential::new()),
    };
    let mut client =
        AzureAgentsClient::new(&config.agent_endpoint, &config.api_version, credential);
    if config.mode != ServerMode::Mcp {
        // Azure AI Search tool
        client = client.with_header("x-ms-enable-preview", "true");
    }

    let mut state = AppState::new(config.clone(), Arc::new(client))
        .with_event_handler(Arc::new(LoggingEventHandler));

    if config.mode.uses_faq_cache() {
        let embeddings = config
            .embeddings
            .as_ref()
            .ok_or("embedding settings are required for the FAQ cache")?;
        let embedder = Arc::new(AzureOpenAIEmbedder::from_config(embeddings));
        let faq = FaqMemory::shared(&config.faq_data_path, embedder)?;
        faq.initialize().await?;
        state = state.with_faq(faq);
    }

    println!("{}", "*".repeat(50));
    println!("Starting agentdesk backend in {:?} mode", config.mode);
    println!("{}", "*".repeat(50));
    serve(state, &config.bind_addr()).await
}
