//! Claude Messages API endpoint.
//!
//! `POST /v1/messages` accepts a Claude request, forwards it to the OpenAI
//! compatible upstream as plain chat text and turns the reply back into Claude
//! content blocks, recovering tool calls and reasoning from the text overlay.

use crate::api::auth::verify_auth;
use crate::api::claude_models::{ClaudeContentBlock, ClaudeMessagesRequest};
use crate::api::disconnect::DisconnectStream;
use crate::api::handlers::AppState;
use crate::core::error_types::UpstreamErrorKind;
use crate::core::logging::generate_request_id;
use crate::core::{get_metrics, AppError, ModelName, Result, StreamCancelHandle};
use crate::services::claude_converter::{claude_to_openai_request, openai_to_claude_response};
use crate::services::claude_encoder::ClaudeStreamEncoder;
use crate::services::prompt::ToolifyPlan;
use crate::streaming::{pump_upstream, ClaudeSseWriter, StreamError, UpstreamUsage};
use crate::toolify::ToolifyParser;
use crate::with_request_context;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Handle `POST /v1/messages`.
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    verify_auth(&headers, state.config.server.client_api_key.as_deref())?;

    let claude_request: ClaudeMessagesRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    let request_id = generate_request_id();
    with_request_context!(request_id.clone(), async move {
        process_message(state, claude_request, request_id).await
    })
}

async fn process_message(
    state: Arc<AppState>,
    claude_request: ClaudeMessagesRequest,
    request_id: String,
) -> Result<Response> {
    validate_request(&claude_request)?;

    let plan = ToolifyPlan::for_request(&claude_request, &state.config.toolify);
    let openai_request = claude_to_openai_request(&claude_request, &state.config.upstream, &plan);

    tracing::debug!(
        request_id = %request_id,
        model = %claude_request.model,
        stream = claude_request.stream,
        tools = plan.trigger_signal.is_some(),
        thinking = plan.thinking_enabled,
        "Processing Claude request"
    );

    state.gate.acquire().await;

    let start = Instant::now();
    let response = send_upstream(&state, &openai_request).await?;

    let mut response = if claude_request.stream {
        handle_streaming_response(response, claude_request.model.clone(), plan, request_id, start)?
    } else {
        handle_non_streaming_response(response, &claude_request.model, &plan).await?
    };

    response
        .extensions_mut()
        .insert(ModelName(claude_request.model));
    Ok(response)
}

fn validate_request(request: &ClaudeMessagesRequest) -> Result<()> {
    if request.messages.is_empty() {
        return Err(AppError::BadRequest(
            "messages: at least one message is required".to_string(),
        ));
    }
    if request.max_tokens <= 0 {
        return Err(AppError::BadRequest(
            "max_tokens: must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// POST the converted request; any non-success status becomes an error before
/// a single byte is sent to the client.
async fn send_upstream(state: &AppState, payload: &Value) -> Result<reqwest::Response> {
    let url = state.config.upstream.chat_completions_url();
    let metrics = get_metrics();

    let response = state
        .http_client
        .post(&url)
        .bearer_auth(&state.config.upstream.api_key)
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            let kind = if e.is_timeout() {
                UpstreamErrorKind::Timeout
            } else {
                UpstreamErrorKind::Transport
            };
            metrics
                .upstream_errors
                .with_label_values(&[kind.as_str()])
                .inc();
            tracing::error!(url = %url, error = %e, "Upstream request failed");
            if e.is_timeout() {
                AppError::Timeout
            } else {
                AppError::Request(e)
            }
        })?;

    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    if status.is_success() {
        return Ok(response);
    }

    let kind = UpstreamErrorKind::from_status(status);
    metrics
        .upstream_errors
        .with_label_values(&[kind.as_str()])
        .inc();

    let body = response.text().await.unwrap_or_default();
    let message = upstream_error_message(&body)
        .unwrap_or_else(|| format!("Upstream returned status {}", status.as_u16()));
    tracing::warn!(status = %status, message = %message, "Upstream returned an error status");

    Err(AppError::Upstream { status, message })
}

/// Pull a readable message out of an OpenAI style error body.
fn upstream_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let message = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| trimmed.to_string());
    Some(message)
}

/// Start the upstream pump in its own task and return the SSE response.
fn handle_streaming_response(
    response: reqwest::Response,
    original_model: String,
    plan: ToolifyPlan,
    request_id: String,
    start: Instant,
) -> Result<Response> {
    let cancel = StreamCancelHandle::new();
    let (mut writer, mut rx) = ClaudeSseWriter::channel(ClaudeStreamEncoder::new(original_model.clone()));
    let mut parser = ToolifyParser::new(plan.trigger_signal, plan.thinking_enabled);

    let ttft_model = original_model.clone();
    let mut first_chunk = true;
    let upstream = Box::pin(response.bytes_stream().inspect(move |_| {
        if first_chunk {
            first_chunk = false;
            get_metrics()
                .ttft
                .with_label_values(&[&ttft_model])
                .observe(start.elapsed().as_secs_f64());
        }
    }));

    let pump_cancel = cancel.clone();
    let pump_request_id = request_id.clone();
    tokio::spawn(async move {
        with_request_context!(pump_request_id.clone(), async move {
            let metrics = get_metrics();
            let outcome = pump_upstream(upstream, &mut parser, &mut writer, &pump_cancel).await;

            let label = match &outcome {
                Ok(outcome) => outcome.as_str(),
                Err(StreamError::Transport(reason)) => {
                    metrics
                        .upstream_errors
                        .with_label_values(&[UpstreamErrorKind::Transport.as_str()])
                        .inc();
                    tracing::warn!(
                        request_id = %pump_request_id,
                        error = %reason,
                        "Upstream stream failed"
                    );
                    "transport_error"
                }
                Err(StreamError::SinkClosed) => "cancelled",
            };
            metrics.stream_outcomes.with_label_values(&[label]).inc();

            if let Some(usage) = writer.encoder().usage() {
                record_token_usage(&original_model, usage);
            }

            tracing::debug!(
                request_id = %pump_request_id,
                outcome = label,
                tool_calls = writer.encoder().tool_calls(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Claude streaming response finished"
            );
            pump_cancel.mark_completed();
        })
    });

    let frames = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, std::io::Error>(frame);
        }
    };
    let body = Body::from_stream(DisconnectStream::new(Box::pin(frames), cancel));

    tracing::debug!(request_id = %request_id, "Claude streaming response started");

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn handle_non_streaming_response(
    response: reqwest::Response,
    original_model: &str,
    plan: &ToolifyPlan,
) -> Result<Response> {
    let data: Value = response.json().await?;
    let claude_response = openai_to_claude_response(&data, original_model, plan)?;

    let tool_calls = claude_response
        .content
        .iter()
        .filter(|block| matches!(block, ClaudeContentBlock::ToolUse(_)))
        .count();
    if tool_calls > 0 {
        get_metrics()
            .tool_calls
            .with_label_values(&["non_stream"])
            .inc_by(tool_calls as u64);
        tracing::info!(tool_calls, "Recovered tool calls from upstream text");
    }

    if let Some(usage) = data.get("usage").and_then(UpstreamUsage::from_value) {
        record_token_usage(original_model, usage);
    }

    Ok(Json(claude_response).into_response())
}

fn record_token_usage(model: &str, usage: UpstreamUsage) {
    let metrics = get_metrics();
    metrics
        .token_usage
        .with_label_values(&[model, "input"])
        .inc_by(usage.prompt_tokens);
    metrics
        .token_usage
        .with_label_values(&[model, "output"])
        .inc_by(usage.completion_tokens);
}
