// Line-delimited JSON-RPC 2.0 server exposing the service manager as MCP tools.
// Malformed lines, notifications and unknown methods get no reply.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::manager::ServiceManager;

pub const PROTOCOL_VERSION: &str = "0.1.0";

pub const INTERNAL_ERROR: i64 = -32000;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct Request {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

pub struct RpcServer<'a> {
    manager: &'a ServiceManager,
}

impl<'a> RpcServer<'a> {
    pub fn new(manager: &'a ServiceManager) -> Self {
        Self { manager }
    }

    /// Serves requests until the input is exhausted.
    pub fn serve<R: BufRead, W: Write>(&self, reader: R, mut writer: W) -> Result<()> {
        for line in reader.lines() {
            let line = line.context("failed to read request")?;
            if let Some(reply) = self.handle_line(&line) {
                writeln!(writer, "{reply}").context("failed to write response")?;
                writer.flush().context("failed to flush response")?;
            }
        }
        log::info!("input closed, stopping RPC server");
        Ok(())
    }

    /// Handles one request line, returning the serialized reply if any.
    pub fn handle_line(&self, line: &str) -> Option<String> {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("dropping malformed request: {}", e);
                return None;
            }
        };

        let outcome = self.dispatch(&request)?;
        let response = match outcome {
            Ok(result) => Response {
                jsonrpc: "2.0",
                result: Some(result),
                error: None,
                id: request.id,
            },
            Err(error) => Response {
                jsonrpc: "2.0",
                result: None,
                error: Some(error),
                id: request.id,
            },
        };

        match serde_json::to_string(&response) {
            Ok(reply) => Some(reply),
            Err(e) => {
                log::error!("failed to serialize response: {}", e);
                None
            }
        }
    }

    fn dispatch(&self, request: &Request) -> Option<std::result::Result<Value, RpcError>> {
        match request.method.as_str() {
            "initialize" => Some(Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "svcm-mcp",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} },
            }))),
            "tools/list" => Some(Ok(json!({ "tools": tool_descriptions() }))),
            "tools/call" => Some(self.call_tool(&request.params)),
            other => {
                log::debug!("ignoring method {}", other);
                None
            }
        }
    }

    fn call_tool(&self, params: &Value) -> std::result::Result<Value, RpcError> {
        let call: ToolCall = serde_json::from_value(params.clone())
            .map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid tool call: {e}")))?;
        log::info!("tool call {}", call.name);

        match call.name.as_str() {
            "list_services" => {
                let services = self
                    .manager
                    .list_services()
                    .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?;
                let text: String = services
                    .iter()
                    .map(|s| format!("{:<30} {} {}\n", s.name, s.active_state, s.description))
                    .collect();
                Ok(text_content(text))
            }
            "start_service" => {
                let name = service_name(&call.arguments)?;
                self.manager
                    .start_service(name)
                    .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?;
                Ok(text_content("Service started".to_string()))
            }
            "stop_service" => {
                let name = service_name(&call.arguments)?;
                self.manager
                    .stop_service(name)
                    .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?;
                Ok(text_content("Service stopped".to_string()))
            }
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }
}

fn service_name(arguments: &Map<String, Value>) -> std::result::Result<&str, RpcError> {
    arguments
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing string argument 'name'"))
}

fn text_content(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn tool_descriptions() -> Value {
    let by_name = json!({
        "type": "object",
        "properties": { "name": { "type": "string" } },
        "required": ["name"],
    });
    json!([
        {
            "name": "list_services",
            "description": "List all services of the service manager",
            "inputSchema": { "type": "object", "properties": {} },
        },
        {
            "name": "start_service",
            "description": "Start a service",
            "inputSchema": by_name,
        },
        {
            "name": "stop_service",
            "description": "Stop a service",
            "inputSchema": by_name,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Scope;
    use crate::manager::unsupported::UnsupportedBackend;

    fn manager() -> ServiceManager {
        ServiceManager::with_backend(Box::new(UnsupportedBackend::new("test")), Scope::User)
    }

    fn reply(server: &RpcServer, line: &str) -> Value {
        serde_json::from_str(&server.handle_line(line).unwrap()).unwrap()
    }

    #[test]
    fn malformed_and_unknown_requests_are_dropped() {
        let manager = manager();
        let server = RpcServer::new(&manager);
        assert!(server.handle_line("not json").is_none());
        assert!(server.handle_line("").is_none());
        assert!(
            server
                .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .is_none()
        );
        assert!(
            server
                .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
                .is_none()
        );
    }

    #[test]
    fn initialize_reports_server_info() {
        let manager = manager();
        let server = RpcServer::new(&manager);
        let value = reply(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#);
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["serverInfo"]["name"], "svcm-mcp");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn tools_list_names_three_tools() {
        let manager = manager();
        let server = RpcServer::new(&manager);
        let value = reply(&server, r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#);
        let names: Vec<&str> = value["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["list_services", "start_service", "stop_service"]);
    }

    #[test]
    fn backend_failure_is_internal_error() {
        let manager = manager();
        let server = RpcServer::new(&manager);
        let value = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"list_services"}}"#,
        );
        assert_eq!(value["error"]["code"], INTERNAL_ERROR);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn unknown_tool_and_missing_name() {
        let manager = manager();
        let server = RpcServer::new(&manager);
        let value = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"reboot"}}"#,
        );
        assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);

        let value = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"start_service","arguments":{}}}"#,
        );
        assert_eq!(value["error"]["code"], INVALID_PARAMS);
    }
}
