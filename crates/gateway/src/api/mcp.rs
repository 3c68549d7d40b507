//! The client-facing JSON-RPC endpoint.
//!
//! - `POST /mcp`: one JSON-RPC message per request
//! - `DELETE /mcp`: close the session named by the header

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::Value;

use tg_domain::tool::{error_result, CallContext, ToolError};
use tg_sessions::{Session, SessionError};

use crate::endpoint::GatewayEndpoint;
use crate::rpc::{RpcRequest, RpcResponse, TransportError, PROTOCOL_VERSION, SESSION_HEADER};
use crate::state::AppState;

/// Argument read from `initialize` params to seed the session's workdir.
const PROJECT_ROOT_PARAM: &str = "projectRoot";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /mcp
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: RpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => return error_response(Value::Null, TransportError::Parse(e.to_string())),
    };
    let id = req.id.clone().unwrap_or(Value::Null);

    if req.method == "initialize" {
        return initialize(&state, &headers, id, req.params).await;
    }

    let session = match resolve_session(&state, &headers) {
        Ok(session) => session,
        Err(e) => return error_response(id, e),
    };

    if req.is_notification() {
        tracing::debug!(session_id = %session.id(), method = %req.method, "notification");
        return StatusCode::ACCEPTED.into_response();
    }

    let result = dispatch(&session, &req.method, req.params).await;
    let body = match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => {
            tracing::debug!(session_id = %session.id(), method = %req.method, error = %e, "request failed");
            RpcResponse::failure(id, &e)
        }
    };
    with_session_header(Json(body).into_response(), session.id())
}

async fn initialize(
    state: &AppState,
    headers: &HeaderMap,
    id: Value,
    params: Option<Value>,
) -> Response {
    let presented = session_header(headers).map(str::to_owned);
    let project_root = params
        .as_ref()
        .and_then(|p| p.get(PROJECT_ROOT_PARAM))
        .and_then(Value::as_str)
        .map(str::to_owned);

    // Detached: a client that disconnects mid-handshake must not abandon a
    // half-built endpoint with its workdir seeded and bridges leased.
    let build_state = state.clone();
    let opened = tokio::spawn(async move {
        let state = &build_state;
        state
            .registry
            .handshake(presented.as_deref(), |session_id| async move {
                state.workdirs.seed(&session_id, project_root.as_deref());
                Ok::<_, String>(GatewayEndpoint::open(state, session_id).await)
            })
            .await
    })
    .await;

    let session = match opened {
        Ok(Ok(session)) => session,
        Ok(Err(SessionError::AlreadyInitialized(_))) => {
            return error_response(id, TransportError::AlreadyInitialized);
        }
        Ok(Err(e)) => return error_response(id, TransportError::Internal(e.to_string())),
        Err(e) => return error_response(id, TransportError::Internal(e.to_string())),
    };

    let result = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": "taskgate",
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    with_session_header(
        Json(RpcResponse::success(id, result)).into_response(),
        session.id(),
    )
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

async fn dispatch(
    session: &Session<GatewayEndpoint>,
    method: &str,
    params: Option<Value>,
) -> Result<Value, TransportError> {
    let endpoint = session.endpoint();
    match method {
        "ping" => Ok(serde_json::json!({})),
        "tools/list" => Ok(serde_json::json!({ "tools": endpoint.tools().definitions() })),
        "tools/call" => {
            let params: CallParams = params
                .ok_or_else(|| TransportError::InvalidParams("missing params".into()))
                .and_then(|p| {
                    serde_json::from_value(p)
                        .map_err(|e| TransportError::InvalidParams(e.to_string()))
                })?;
            let ctx = CallContext {
                session_id: session.id().to_owned(),
                tool_name: params.name,
            };
            let args = params
                .arguments
                .unwrap_or_else(|| Value::Object(Default::default()));

            let _call = session.begin_call();
            let outcome = tokio::select! {
                r = endpoint.tools().call(ctx, args) => r,
                _ = session.cancel_token().cancelled() => {
                    Err(ToolError::Cancelled("session closed".into()))
                }
            };
            Ok(outcome.unwrap_or_else(|e| error_result(e.to_string())))
        }
        other => Err(TransportError::MethodNotFound(other.to_owned())),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /mcp
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return error_response(Value::Null, TransportError::MissingSession);
    };
    match state.registry.close(session_id, "client closed").await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => error_response(Value::Null, TransportError::SessionNotFound),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<std::sync::Arc<Session<GatewayEndpoint>>, TransportError> {
    let session_id = session_header(headers).ok_or(TransportError::MissingSession)?;
    state
        .registry
        .get(session_id)
        .map_err(|_| TransportError::SessionNotFound)
}

fn error_response(id: Value, err: TransportError) -> Response {
    (err.status(), Json(RpcResponse::failure(id, &err))).into_response()
}

fn with_session_header(mut resp: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        resp.headers_mut().insert(SESSION_HEADER, value);
    }
    resp
}
