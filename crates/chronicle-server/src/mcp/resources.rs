// mcp/resources.rs
// MCP Resource handlers — one markdown resource per archived item

use chronicle_types::Item;
use rmcp::{
    model::{
        AnnotateAble, Annotated, ListResourcesResult, PaginatedRequestParams, RawResource,
        ReadResourceRequestParams, ReadResourceResult, ResourceContents,
    },
    service::{RequestContext, RoleServer},
};

use super::ChronicleServer;
use crate::db;

/// URI prefix for chat resources.
const CHAT_URI_PREFIX: &str = "chronicle://chats/";

/// Helper to wrap a raw resource without annotations.
fn no_ann<T: AnnotateAble>(raw: T) -> Annotated<T> {
    Annotated::new(raw, None)
}

/// Build the resource descriptor for one item.
fn item_resource(item: &Item) -> Annotated<RawResource> {
    no_ann(RawResource {
        uri: format!("{CHAT_URI_PREFIX}{}", item.id),
        name: item.title.clone(),
        title: None,
        description: Some(item.summary.clone()),
        mime_type: Some("text/markdown".into()),
        size: None,
        icons: None,
        meta: None,
    })
}

/// Render one item as the markdown document served over `resources/read`.
pub(super) fn render_item_markdown(item: &Item) -> String {
    use chrono::TimeZone;

    let date = chrono::Local
        .timestamp_millis_opt(item.created_at)
        .single()
        .map(|d| d.format("%B %e, %Y").to_string())
        .unwrap_or_default();
    let memory_type = item
        .memory_type
        .map(|t| t.as_str().to_string())
        .unwrap_or_default();

    format!(
        "# {title}\n\
         **Date:** {date}\n\
         **Source:** {source}\n\
         **Tags:** {tags}\n\
         **Memory Type:** {memory_type}\n\
         **Salience:** {salience}\n\
         \n\
         ## Summary\n\
         {summary}\n\
         \n\
         ## Transcript\n\
         {content}",
        title = item.title,
        date = date,
        source = item.source,
        tags = item.tags.join(", "),
        memory_type = memory_type,
        salience = item.salience,
        summary = item.summary,
        content = item.content,
    )
}

impl ChronicleServer {
    /// Handle `resources/list`: one resource per item, newest first.
    pub(super) async fn handle_list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, rmcp::ErrorData> {
        let items = self
            .pool
            .run(db::load_items_sync)
            .await
            .map_err(|e| {
                rmcp::ErrorData::internal_error(format!("Failed to list resources: {e}"), None)
            })?;

        Ok(ListResourcesResult {
            resources: items.iter().map(item_resource).collect(),
            next_cursor: None,
            meta: None,
        })
    }

    /// Handle `resources/read` for `chronicle://chats/<id>`.
    pub(super) async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, rmcp::ErrorData> {
        let uri = request.uri.clone();
        let Some(id) = uri.strip_prefix(CHAT_URI_PREFIX) else {
            return Err(rmcp::ErrorData::invalid_params(
                format!("Unknown resource URI: {uri}"),
                None,
            ));
        };

        let lookup_id = id.to_string();
        let item = self
            .pool
            .run(move |conn| db::get_item_sync(conn, &lookup_id))
            .await
            .map_err(|e| {
                rmcp::ErrorData::internal_error(format!("Failed to read resource: {e}"), None)
            })?;

        let Some(item) = item else {
            return Err(rmcp::ErrorData::invalid_params(
                format!("Chat not found: {id}"),
                None,
            ));
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri,
                mime_type: Some("text/markdown".into()),
                text: render_item_markdown(&item),
                meta: None,
            }],
        })
    }
}
