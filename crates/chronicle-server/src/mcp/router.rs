// mcp/router.rs
// MCP tool router — #[tool] annotated methods

use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    tool, tool_router,
};

use super::ChronicleServer;
use super::requests::*;
use super::tools;

/// Map a tool body's `Result<String, String>` onto the wire shape: `Err`
/// becomes an `isError` payload, not a protocol failure.
fn tool_result(result: Result<String, String>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
    }
}

#[tool_router(vis = "pub(crate)")]
impl ChronicleServer {
    #[tool(
        description = "Search archived chats and notes by keyword across titles, summaries, and tags. Returns up to 10 matches as JSON, newest first."
    )]
    async fn search_archive(
        &self,
        Parameters(req): Parameters<SearchArchiveRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(
            tools::search_archive(self, req.query, req.memory_type, req.min_salience).await,
        )
    }

    #[tool(
        description = "Find chats similar to a target chat by embedding distance. Returns JSON with a 0-1 score per match, best first; the target itself is excluded."
    )]
    async fn semantic_search(
        &self,
        Parameters(req): Parameters<SemanticSearchRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(
            tools::semantic_search(
                self,
                req.target_id,
                req.limit,
                req.memory_type,
                req.min_salience,
            )
            .await,
        )
    }

    #[tool(description = "List the most recently imported chats and notes.")]
    async fn list_recent_chats(
        &self,
        Parameters(req): Parameters<ListRecentChatsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::list_recent_chats(self, req.count).await)
    }

    #[tool(description = "List every tag in the archive, sorted, comma-joined.")]
    async fn list_tags(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::list_tags(self).await)
    }
}
