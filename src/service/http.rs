//! The HTTP service adapter: `POST /{flow_name}` for every registered flow,
//! server-sent events for streaming flows, `GET /health`, and a bonus
//! `/list_tool_flows` introspection endpoint.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{self, Stream};
use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::ToolInvocationAdapter;
use crate::service_context::ServiceContext;
use crate::tool_call::ToolCall;

/// Validate `request` against `tool`'s input schema, rendered as a JSON
/// Schema `parameters` object the same way its function descriptor is.
/// Returns the validator's error messages, empty if the request is valid.
fn validate_against_tool(tool: &ToolCall, request: &Value) -> Vec<String> {
    let descriptor = tool.to_function_descriptor();
    let schema = &descriptor["function"]["parameters"];
    let compiled = match JSONSchema::options().with_draft(Draft::Draft7).compile(schema) {
        Ok(compiled) => compiled,
        Err(error) => return vec![error.to_string()],
    };
    let result = match compiled.validate(request) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.map(|error| error.to_string()).collect(),
    };
    result
}

#[derive(Clone)]
struct AppState {
    context: Arc<ServiceContext>,
}

pub fn router(context: Arc<ServiceContext>) -> Router {
    let state = AppState { context };
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/list_tool_flows", get(list_tool_flows))
        .route("/{flow_name}", post(call_flow))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve forever.
pub async fn serve(context: Arc<ServiceContext>) -> std::io::Result<()> {
    let http_config = context.config.http.clone();
    let addr: SocketAddr = format!("{}:{}", http_config.host, http_config.port)
        .parse()
        .expect("invalid host/port in http config");

    let app = router(context);

    tracing::info!(%addr, "http adapter listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn list_tool_flows(State(state): State<AppState>) -> impl IntoResponse {
    let descriptors = ToolInvocationAdapter::new(state.context).catalogue();
    Json(descriptors)
}

async fn call_flow(
    State(state): State<AppState>,
    Path(flow_name): Path<String>,
    Json(request): Json<Map<String, Value>>,
) -> impl IntoResponse {
    let Some(flow) = state.context.flow(&flow_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "success": false, "metadata": { "error": format!("flow '{flow_name}' not found") } })),
        )
            .into_response();
    };

    if let Some(tool) = flow.tool_call() {
        let errors = validate_against_tool(&tool, &Value::Object(request.clone()));
        if !errors.is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "success": false, "metadata": { "error": errors.join("; ") } })),
            )
                .into_response();
        }
    }

    if flow.stream {
        let receiver = flow.start_stream(request, Some(state.context.config.clone()));
        let event_stream = stream::unfold(receiver, |mut receiver| async move {
            let chunk = receiver.recv().await?;
            let done = chunk.done;
            let payload = if done {
                "[DONE]".to_string()
            } else {
                serde_json::to_string(&chunk).unwrap_or_default()
            };
            let event: Result<Event, Infallible> = Ok(Event::default().data(payload));
            Some((event, receiver))
        });
        let boxed: Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(event_stream);
        Sse::new(boxed).into_response()
    } else {
        match flow.async_call(request, Some(state.context.config.clone())).await {
            Ok(response) => Json(response).into_response(),
            Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({
                "success": false,
                "metadata": { "error": error.to_string() },
            })))
                .into_response(),
        }
    }
}
