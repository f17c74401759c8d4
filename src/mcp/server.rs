use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, Implementation, ListResourcesResult, PaginatedRequestParam, ProtocolVersion,
    RawResource, ReadResourceRequestParam, ReadResourceResult, ResourceContents,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{
    ErrorData as McpError, Json, RoleServer, ServerHandler, ServiceExt, tool, tool_handler,
    tool_router,
};

use crate::catalog::Catalog;
use crate::debug_log;
use crate::error::StoreError;
use crate::query::ListQuery;
use crate::types::ItemKey;

use super::types::*;

/// Resource URI constants
mod resource_uris {
    pub const STATS: &str = "catalog://stats";
    pub const ITEMS: &str = "catalog://items";
}

/// Items shown by the `catalog://items` resource
const ITEMS_PREVIEW: usize = 20;

/// The Catalog MCP Server
#[derive(Clone)]
pub struct CatalogMcpServer {
    catalog: Catalog,
    tool_router: ToolRouter<Self>,
}

/// Tool errors carry the failure class so clients can tell bad input from a broken store.
fn tool_error(tool: &str, err: StoreError) -> String {
    debug_log::log("MCP", tool, &format!("failed: {err}"));
    if err.is_client_error() {
        format!("Invalid request: {err}")
    } else {
        format!("Catalog unavailable: {err}")
    }
}

fn resource_error(err: StoreError) -> McpError {
    if err.is_client_error() {
        McpError::invalid_params(err.to_string(), None)
    } else {
        McpError::internal_error(format!("Failed to read catalog: {err}"), None)
    }
}

impl CatalogMcpServer {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl CatalogMcpServer {
    #[tool(
        name = "list_items",
        description = "List catalog items. Supports a case-insensitive name filter (q) and offset/limit pagination; the response includes the total number of matches."
    )]
    async fn list_items(
        &self,
        Parameters(req): Parameters<ListItemsRequest>,
    ) -> Result<Json<ItemListResponse>, String> {
        debug_log::log("MCP", "list_items", &format!("{req:?}"));
        let query = ListQuery::from_ints(req.q, req.offset, req.limit);
        let page = self
            .catalog
            .list(&query)
            .await
            .map_err(|e| tool_error("list_items", e))?;
        Ok(Json(ItemListResponse::from(page)))
    }

    #[tool(
        name = "get_item",
        description = "Fetch a single catalog item by its id (number or string)."
    )]
    async fn get_item(
        &self,
        Parameters(req): Parameters<GetItemRequest>,
    ) -> Result<Json<ItemResponse>, String> {
        let key = ItemKey::from(req.id);
        debug_log::log("MCP", "get_item", &key.to_string());
        let item = self
            .catalog
            .get(&key)
            .await
            .map_err(|e| tool_error("get_item", e))?;
        Ok(Json(ItemResponse {
            item: item.into_value(),
        }))
    }

    #[tool(
        name = "create_item",
        description = "Create a catalog item. A name is required; extra fields are stored as given. Returns the item with its generated id once it is written to disk."
    )]
    async fn create_item(
        &self,
        Parameters(req): Parameters<CreateItemRequest>,
    ) -> Result<Json<ItemResponse>, String> {
        debug_log::log("MCP", "create_item", &req.name);
        let item = self
            .catalog
            .create(req.into_payload())
            .await
            .map_err(|e| tool_error("create_item", e))?;
        Ok(Json(ItemResponse {
            item: item.into_value(),
        }))
    }

    #[tool(
        name = "get_stats",
        description = "Get aggregate catalog statistics: total item count and the average of the configured numeric field."
    )]
    async fn get_stats(
        &self,
        Parameters(_req): Parameters<GetStatsRequest>,
    ) -> Result<Json<StatsResponse>, String> {
        debug_log::log("MCP", "get_stats", "");
        let stats = self
            .catalog
            .stats()
            .await
            .map_err(|e| tool_error("get_stats", e))?;
        Ok(Json(StatsResponse::from(stats)))
    }
}

#[tool_handler]
impl ServerHandler for CatalogMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "catalog".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Item Catalog".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Catalog MCP Server - a small item catalog backed by a JSON file. \
                 List and search items, fetch one by id, create items, and read aggregate stats."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![
                RawResource::new(resource_uris::STATS, "Catalog Stats".to_string())
                    .no_annotation(),
                RawResource::new(resource_uris::ITEMS, "Catalog Items".to_string())
                    .no_annotation(),
            ],
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match uri.as_str() {
            resource_uris::STATS => {
                let stats = self.catalog.stats().await.map_err(resource_error)?;
                let summary = format!(
                    "Items: {}\nAverage: {:.2}",
                    stats.total, stats.average
                );
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(summary, uri)],
                })
            }
            resource_uris::ITEMS => {
                let query = ListQuery {
                    limit: Some(ITEMS_PREVIEW),
                    ..ListQuery::default()
                };
                let page = self.catalog.list(&query).await.map_err(resource_error)?;
                let mut lines: Vec<String> = page
                    .items
                    .iter()
                    .map(|item| {
                        let id = item.id().map(|v| v.to_string()).unwrap_or_default();
                        format!("{id}: {}", item.name().unwrap_or(""))
                    })
                    .collect();
                if page.total > page.items.len() {
                    lines.push(format!("... {} more", page.total - page.items.len()));
                }
                let content = if lines.is_empty() {
                    "No items in catalog".to_string()
                } else {
                    lines.join("\n")
                };
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(content, uri)],
                })
            }
            _ => Err(McpError::resource_not_found(
                "resource_not_found",
                Some(serde_json::json!({ "uri": uri })),
            )),
        }
    }
}

/// Run the MCP server with stdio transport
pub async fn run_mcp_server(catalog: Catalog) -> anyhow::Result<()> {
    use rmcp::transport::stdio;

    let server = CatalogMcpServer::new(catalog);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
