//! MCP server implementation.
//!
//! Dispatches JSON-RPC requests to the single `screentime_sql` tool and
//! serves them over stdio. The SSE transport lives in [`super::sse`].

use super::protocol::*;
use crate::error::Result;
use crate::tool::{QueryRequest, QueryTool, TOOL_NAME};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::time::Duration;

/// Delay between a one-shot tool call and process exit
const ONE_SHOT_EXIT_DELAY: Duration = Duration::from_secs(1);

/// The MCP server.
pub struct McpServer {
    name: String,
    version: String,
    tool: QueryTool,
    one_shot: bool,
}

impl McpServer {
    /// Create a server exposing `tool`.
    pub fn new(tool: QueryTool) -> Self {
        Self {
            name: "screentime-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tool,
            one_shot: false,
        }
    }

    /// Override the name and version reported by `initialize`.
    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    /// Exit the process shortly after the first tool call.
    pub fn with_one_shot(mut self, one_shot: bool) -> Self {
        self.one_shot = one_shot;
        self
    }

    /// Run the server with stdio transport.
    pub fn run_stdio(&self) -> Result<()> {
        tracing::info!("MCP STDIO server started");

        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.serve(stdin.lock(), stdout.lock())
    }

    /// Serve newline-delimited JSON-RPC from `input` until it is exhausted.
    pub fn serve<R: BufRead, W: Write>(&self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line) {
                let response_json = serde_json::to_string(&response)?;
                writeln!(output, "{}", response_json)?;
                output.flush()?;
            }
        }

        tracing::info!("MCP STDIO input closed");
        Ok(())
    }

    /// Handle one raw JSON-RPC message.
    pub fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable JSON-RPC message");
                Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a JSON-RPC request. Notifications get no response.
    pub fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Notification received");
            return None;
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params),
            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": self.name,
                "version": self.version
            },
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: Some(self.tool.description()),
            input_schema: self.tool.input_schema(),
            annotations: Some(ToolAnnotations {
                title: Some("Screen Time SQL".to_string()),
                read_only_hint: Some(true),
                open_world_hint: Some(false),
            }),
        }
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({ "tools": [self.tool_definition()] });
        JsonRpcResponse::success(id, result)
    }

    fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e))
                }
            },
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        if params.name != TOOL_NAME {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("Tool not found: {}", params.name),
            );
        }

        let outcome = QueryRequest::from_arguments(params.arguments)
            .and_then(|request| self.tool.handle(&request));
        let response = match outcome {
            Ok(csv) => CallToolResponse::text(csv),
            Err(e) => {
                tracing::warn!(error = %e, "Tool call failed");
                CallToolResponse::error(e.to_string())
            }
        };

        if self.one_shot {
            schedule_exit();
        }

        JsonRpcResponse::success(
            id,
            json!({
                "content": response.content,
                "isError": response.is_error
            }),
        )
    }
}

fn schedule_exit() {
    tracing::info!("One shot exit in one second");
    std::thread::spawn(|| {
        std::thread::sleep(ONE_SHOT_EXIT_DELAY);
        std::process::exit(1);
    });
}
