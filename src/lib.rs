//! Toolify Gateway - Claude Messages API in front of OpenAI compatible upstreams
//!
//! Many OpenAI compatible backends cannot call tools natively. The gateway
//! teaches them a small text protocol instead and recovers structured calls
//! from the streamed text:
//!
//! - **Prompt injection**: tools are described in the system prompt together
//!   with a trigger signal and an `<invoke>` syntax
//! - **Streaming recovery**: upstream SSE text is fed character by character
//!   into a state machine that emits text, thinking and tool call events
//! - **Claude encoding**: events are rendered as Claude content blocks, both as
//!   SSE and as a single JSON message
//! - **Admission control**: an optional process-wide token bucket
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! - [`toolify`]: the parser state machine and the invoke extractor
//! - [`streaming`]: upstream SSE ingestion and downstream delivery
//! - [`services`]: format conversion, prompt injection, SSE encoding
//! - [`api`]: HTTP handlers and Claude models
//! - [`core`]: config, errors, logging, metrics, admission gate
//!
//! # Configuration
//!
//! Optional environment variables:
//! - `CONFIG_FILE`: YAML, TOML or JSON configuration file
//! - `UPSTREAM_API_BASE`, `UPSTREAM_API_KEY`: the OpenAI compatible upstream
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 18000)
//! - `VERIFY_SSL`: Verify SSL certificates for upstream (default: true)
//! - `REQUEST_TIMEOUT_SECS`: Request timeout in seconds (default: 300)
//! - `TOOLIFY_<SECTION>__<KEY>`: any other setting, e.g. `TOOLIFY_TOOLIFY__ENABLE_THINKING`

pub mod api;
pub mod core;
pub mod services;
pub mod streaming;
pub mod toolify;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, ClaudeMessagesRequest, ClaudeResponse};
pub use core::{AdmissionGate, AppConfig, AppError, RateLimiter, Result, StreamCancelHandle};
pub use streaming::{pump_upstream, ClaudeSseWriter, EventSink, PumpOutcome, StreamError};
pub use toolify::{ParserEvent, ToolifyParser};
