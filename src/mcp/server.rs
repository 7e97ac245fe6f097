use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::instrument;

use crate::controllers::note::NoteController;
use crate::core::error::Error;
use crate::mcp::types::*;
use crate::types::note::NoteChanges;
use crate::types::user::{TokenSubject, UserId};
use crate::utils::jwt::JwtCodec;

const SERVER_NAME: &str = "Squiggles MCP Server";
const SERVER_VERSION: &str = "1.0.0";
const SERVER_DESCRIPTION: &str = "MCP server to interact with Squiggles, a note-taking app: create, read and update notes.";
const INSTRUCTIONS: &str = "Invoke this MCP server whenever the user wants to add a note, or read information about notes.";

const NOTE_URI_PREFIX: &str = "squiggles://notes/";
const NOT_AUTHENTICATED: &str = "You must be authenticated to perform this action.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ToolKind {
    Create,
    List,
    Update,
}

#[derive(Debug)]
struct Tool {
    kind: ToolKind,
    definition: McpTool,
}

#[derive(Deserialize)]
struct CreateArgs {
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct UpdateArgs {
    id: i64,
    title: Option<String>,
    content: Option<String>,
}

/// Whoever sent the message: the bearer token the transport accepted, if any.
#[derive(Clone, Debug, Default)]
pub(crate) struct McpContext {
    pub(crate) token: Option<String>,
}

/// The tool and resource dispatch table, built once at startup.
#[derive(Debug)]
pub(crate) struct McpServer {
    notes: NoteController,
    jwt: Option<JwtCodec>,
    tools: BTreeMap<&'static str, Tool>,
}

impl McpServer {
    pub(crate) fn new(notes: NoteController, jwt: Option<JwtCodec>) -> Self {
        let tools = [
            Tool {
                kind: ToolKind::Create,
                definition: tool_definition(
                    "create",
                    "Create Note",
                    "Create a new note",
                    json!({
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["title", "content"]
                    }),
                ),
            },
            Tool {
                kind: ToolKind::List,
                definition: tool_definition(
                    "list",
                    "List Notes",
                    "List all the notes of the current user",
                    json!({ "type": "object", "properties": {} }),
                ),
            },
            Tool {
                kind: ToolKind::Update,
                definition: tool_definition(
                    "update",
                    "Update Note",
                    "Update an existing note",
                    json!({
                        "type": "object",
                        "properties": {
                            "id": { "type": "number" },
                            "title": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["id"]
                    }),
                ),
            },
        ]
        .into_iter()
        .map(|tool| (tool_name(tool.kind), tool))
        .collect();

        Self { notes, jwt, tools }
    }

    /// Handles one raw message body, single or batch. `None` when nothing
    /// needs to be sent back (only notifications).
    pub(crate) async fn handle_message(&self, body: &[u8], ctx: &McpContext) -> Option<Value> {
        let message: Value = match serde_json::from_slice(body) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("unparseable MCP message: {}", e);
                return to_value(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(PARSE_ERROR, "Parse error"),
                ));
            }
        };

        match message {
            Value::Array(batch) if batch.is_empty() => to_value(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(INVALID_REQUEST, "Invalid Request"),
            )),
            Value::Array(batch) => {
                let mut responses = Vec::new();
                for message in batch {
                    if let Some(response) = self.handle_value(message, ctx).await {
                        responses.push(response);
                    }
                }

                (!responses.is_empty()).then(|| to_value(responses)).flatten()
            }
            message => self
                .handle_value(message, ctx)
                .await
                .and_then(to_value),
        }
    }

    async fn handle_value(&self, message: Value, ctx: &McpContext) -> Option<JsonRpcResponse> {
        match serde_json::from_value::<JsonRpcRequest>(message) {
            Ok(request) => self.handle(request, ctx).await,
            Err(_) => Some(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(INVALID_REQUEST, "Invalid Request"),
            )),
        }
    }

    #[instrument(skip(self, request, ctx), fields(method = %request.method))]
    pub(crate) async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: &McpContext,
    ) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!("MCP notification");
            return None;
        }

        let id = request.id.unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            METHOD_INITIALIZE => self.initialize(params),
            METHOD_PING => Ok(json!({})),
            METHOD_TOOLS_LIST => to_result(ListToolsResponse {
                tools: self.tools.values().map(|t| t.definition.clone()).collect(),
            }),
            METHOD_TOOLS_CALL => self.call_tool(params, ctx).await,
            METHOD_RESOURCES_LIST => self.list_resources(ctx).await,
            METHOD_RESOURCES_TEMPLATES_LIST => to_result(ListResourceTemplatesResponse {
                resource_templates: vec![ResourceTemplate {
                    uri_template: format!("{}{{id}}", NOTE_URI_PREFIX),
                    name: "notes".to_string(),
                    title: Some("Notes".to_string()),
                    description: Some("A note in Squiggles".to_string()),
                }],
            }),
            METHOD_RESOURCES_READ => self.read_resource(params, ctx).await,
            method => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            )),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn initialize(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = parse_params(params)?;

        let protocol_version = params
            .protocol_version
            .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(&version.as_str()))
            .unwrap_or_else(|| LATEST_PROTOCOL_VERSION.to_string());

        to_result(InitializeResponse {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ListChangedCapability { list_changed: true }),
                resources: Some(ListChangedCapability { list_changed: true }),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
                description: Some(SERVER_DESCRIPTION.to_string()),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        })
    }

    /// Resolves the caller from a verified bearer JWT.
    fn caller(&self, ctx: &McpContext) -> Result<UserId, Error> {
        let token = ctx.token.as_deref().ok_or(Error::NonAuthenticated)?;
        let jwt = self.jwt.as_ref().ok_or(Error::InvalidSession)?;

        Ok(jwt.verify::<TokenSubject>(token)?.data.user_id)
    }

    async fn call_tool(&self, params: Value, ctx: &McpContext) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params)?;

        let tool = self.tools.get(params.name.as_str()).ok_or_else(|| {
            JsonRpcError::new(INVALID_PARAMS, format!("Unknown tool: {}", params.name))
        })?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        let response = match tool.kind {
            ToolKind::Create => {
                let args: CreateArgs = parse_params(arguments)?;
                match self.caller(ctx) {
                    Ok(user_id) => self.create_note(user_id, args).await,
                    Err(e) => Ok(auth_failure(&e)),
                }
            }
            ToolKind::List => match self.caller(ctx) {
                Ok(user_id) => self.list_notes(user_id).await,
                Err(e) => Ok(auth_failure(&e)),
            },
            ToolKind::Update => {
                let args: UpdateArgs = parse_params(arguments)?;
                match self.caller(ctx) {
                    Ok(user_id) => self.update_note(user_id, args).await,
                    Err(e) => Ok(auth_failure(&e)),
                }
            }
        };

        to_result(response.map_err(internal_error)?)
    }

    async fn create_note(&self, user_id: UserId, args: CreateArgs) -> Result<CallToolResponse, Error> {
        let note = self
            .notes
            .create(user_id, Some(args.title.as_str()), Some(args.content.as_str()))
            .await?;

        tracing::debug!(note_id = note.id, "Created note from MCP");

        Ok(CallToolResponse::text(format!(
            "Note \"{}\" created successfully.",
            note.title
        )))
    }

    async fn list_notes(&self, user_id: UserId) -> Result<CallToolResponse, Error> {
        let notes = self.notes.list(user_id).await?;

        Ok(CallToolResponse {
            content: vec![ToolResponseContent::Text {
                text: serde_json::to_string(&notes)?,
                mime_type: Some("application/json".to_string()),
            }],
            is_error: None,
        })
    }

    async fn update_note(&self, user_id: UserId, args: UpdateArgs) -> Result<CallToolResponse, Error> {
        let changes = NoteChanges {
            title: args.title,
            content: args.content,
        };

        Ok(match self.notes.update(user_id, args.id, changes).await? {
            Some(note) => {
                CallToolResponse::text(format!("Note \"{}\" updated successfully.", note.title))
            }
            None => CallToolResponse::error("Note not found"),
        })
    }

    async fn list_resources(&self, ctx: &McpContext) -> Result<Value, JsonRpcError> {
        let user_id = self.caller(ctx).map_err(unauthorized)?;
        let notes = self.notes.list(user_id).await.map_err(internal_error)?;

        to_result(ListResourcesResponse {
            resources: notes
                .into_iter()
                .map(|note| Resource {
                    uri: format!("{}{}", NOTE_URI_PREFIX, note.id),
                    name: note.title.clone(),
                    title: Some(note.title),
                    mime_type: None,
                })
                .collect(),
        })
    }

    async fn read_resource(&self, params: Value, ctx: &McpContext) -> Result<Value, JsonRpcError> {
        let params: ReadResourceParams = parse_params(params)?;

        let id = params
            .uri
            .strip_prefix(NOTE_URI_PREFIX)
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| {
                JsonRpcError::new(INVALID_PARAMS, format!("Unknown resource: {}", params.uri))
            })?;

        let user_id = self.caller(ctx).map_err(unauthorized)?;
        let note = self.notes.get(user_id, id).await.map_err(internal_error)?;

        to_result(ReadResourceResponse {
            contents: vec![TextResourceContents {
                uri: params.uri,
                mime_type: None,
                text: note.map_or_else(|| "Note not found".to_string(), |note| note.content),
            }],
        })
    }
}

fn tool_name(kind: ToolKind) -> &'static str {
    match kind {
        ToolKind::Create => "create",
        ToolKind::List => "list",
        ToolKind::Update => "update",
    }
}

fn tool_definition(name: &str, title: &str, description: &str, input_schema: Value) -> McpTool {
    McpTool {
        name: name.to_string(),
        title: Some(title.to_string()),
        description: Some(description.to_string()),
        input_schema,
        annotations: Some(ToolAnnotations {
            title: Some(title.to_string()),
        }),
    }
}

fn auth_message(error: &Error) -> String {
    match error {
        Error::NonAuthenticated => NOT_AUTHENTICATED.to_string(),
        other => other.to_string(),
    }
}

fn auth_failure(error: &Error) -> CallToolResponse {
    CallToolResponse::error(auth_message(error))
}

fn unauthorized(error: Error) -> JsonRpcError {
    JsonRpcError::new(UNAUTHORIZED, auth_message(&error))
}

fn internal_error(error: Error) -> JsonRpcError {
    tracing::error!("MCP request failed: {:?}", error);
    JsonRpcError::new(INTERNAL_ERROR, "Internal error")
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    let params = if params.is_null() { json!({}) } else { params };

    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| internal_error(Error::Serialize(e)))
}

fn to_value<T: serde::Serialize>(value: T) -> Option<Value> {
    serde_json::to_value(value)
        .inspect_err(|e| tracing::error!("failed to serialize MCP response: {}", e))
        .ok()
}
