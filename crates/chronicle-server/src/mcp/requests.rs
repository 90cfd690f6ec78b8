// mcp/requests.rs
// Request types for tools with parameters

use serde::Deserialize;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchArchiveRequest {
    #[schemars(description = "Keyword query matched against titles, summaries, and tags")]
    pub query: String,
    #[schemars(description = "Filter: episodic/semantic/procedural/emotional/default")]
    pub memory_type: Option<String>,
    #[schemars(description = "Filter: minimum salience (0.0-1.0)")]
    pub min_salience: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SemanticSearchRequest {
    #[serde(rename = "targetId")]
    #[schemars(description = "Chat ID whose embedding seeds the search")]
    pub target_id: String,
    #[schemars(description = "Max results (default 5)")]
    pub limit: Option<usize>,
    #[schemars(description = "Filter: episodic/semantic/procedural/emotional/default")]
    pub memory_type: Option<String>,
    #[schemars(description = "Filter: minimum salience (0.0-1.0)")]
    pub min_salience: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListRecentChatsRequest {
    #[schemars(description = "How many items to return (default 5, minimum 1)")]
    pub count: Option<i64>,
}
