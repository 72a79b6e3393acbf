//! The agents the backend creates.

use crate::agentdesk::agents_api::{AgentDefinition, ToolDefinition};

pub const MCP_AGENT_NAME: &str = "MCP-Demo-Agent";
pub const RAG_AGENT_NAME: &str = "AI-Agent-rag";
pub const KNOWLEDGE_EXPERT_NAME: &str = "Coffee-Knowledge-Expert";
pub const SYSTEM_EXPERT_NAME: &str = "Systemadmin-Expert";

/// Single agent answering with the MCP plugins and the code interpreter.
pub fn mcp_agent(model: &str) -> AgentDefinition {
    AgentDefinition::new(
        model,
        MCP_AGENT_NAME,
        "An agent that can answer questions about system monitoring, weather, and current time.",
        "You are an assistant Agent for answering questions about system monitoring, weather, \
         and current time. You can use the SystemLogRepository plugin to log system events and \
         retrieve logs. Use the Weather plugin to get current weather information and the \
         GetSystemLocalTime plugin to retrieve the current system time.",
    )
    .with_tool(ToolDefinition::CodeInterpreter)
}

/// Single agent grounded on an Azure AI Search index.
pub fn rag_agent(model: &str, search_connection_id: &str, index_name: &str) -> AgentDefinition {
    AgentDefinition::new(
        model,
        RAG_AGENT_NAME,
        "An agent that can answer questions for user.",
        "You are an assistant Agent for answering questions. Your conversation is grounded in \
         the context of the user query and data from search or knowledge base. Do not make up \
         answers. If you do not know the answer, say 'I don't know'.",
    )
    .with_tool(ToolDefinition::AzureAiSearch)
    .with_tool_resources(ToolDefinition::azure_ai_search_resources(
        search_connection_id,
        index_name,
    ))
}

/// Group chat member that searches documents.
pub fn knowledge_expert(
    model: &str,
    search_connection_id: &str,
    index_name: &str,
) -> AgentDefinition {
    AgentDefinition::new(
        model,
        KNOWLEDGE_EXPERT_NAME,
        "A knowledge expert, and Starbucks coffee enthusiast, that can search through documents \
         to find information.",
        "You are a knowledge expert who can search through memories, documents and knowledge \
         bases to find information.\n\n\
         When asked a question:\n\
         1. Starbucks related questions should be answered using the FAQ memory\n\
         2. Else, use the Azure AI Search tool to find relevant documents\n\
         3. If you don't find relevant information, state what you tried and that you couldn't \
         find an answer\n\
         4. When you're confident in your final answer, begin your response with \"FINAL ANSWER:\"\n\
         5. Collaborate with the System Expert to provide the most comprehensive answer",
    )
    .with_tool(ToolDefinition::AzureAiSearch)
    .with_tool_resources(ToolDefinition::azure_ai_search_resources(
        search_connection_id,
        index_name,
    ))
}

/// Group chat member with the MCP plugins and the code interpreter.
pub fn system_expert(model: &str) -> AgentDefinition {
    AgentDefinition::new(
        model,
        SYSTEM_EXPERT_NAME,
        "A system expert who can access system information and perform system operations.",
        "You are a system expert who can retrieve weather information, system time, and monitor \
         system operations.\n\n\
         When asked a question:\n\
         1. If it relates to weather, use the Weather plugin to get current weather information\n\
         2. If it relates to time, use the GetSystemLocalTime plugin to get the current time\n\
         3. If it relates to system monitoring, use the SystemLogRepository plugin\n\
         4. Use the code interpreter when calculations or data processing is needed\n\
         5. When you're confident in your final answer, begin your response with \"FINAL ANSWER:\"\n\
         6. Collaborate with the Knowledge Expert to provide the most comprehensive answer",
    )
    .with_tool(ToolDefinition::CodeInterpreter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentdesk::group_chat::FINAL_ANSWER_MARKER;

    #[test]
    fn test_group_members_know_the_marker() {
        for definition in [knowledge_expert("m", "c", "i"), system_expert("m")] {
            assert!(definition.instructions.contains(FINAL_ANSWER_MARKER));
            assert!((definition.top_p - 0.1).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_search_agents_bind_the_index() {
        let rag = rag_agent("gpt-4.1", "conn-1", "coffee-docs");
        assert_eq!(rag.tools, vec![ToolDefinition::AzureAiSearch]);
        let resources = rag.tool_resources.unwrap();
        assert_eq!(
            resources["azure_ai_search"]["indexes"][0]["index_connection_id"],
            "conn-1"
        );
        assert_eq!(mcp_agent("m").tools, vec![ToolDefinition::CodeInterpreter]);
    }
}
