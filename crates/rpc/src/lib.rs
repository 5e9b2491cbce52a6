//! HTTP API for the chainkey key registry.
//!
//! Exposes `POST /generate-key` and `GET /get-details/:uniqueKey` on top of a
//! shared [`KeyRegistry`](chainkey_key_registry::KeyRegistry), plus health and
//! version probes.

pub mod keys;
pub mod server;


pub use keys::{GenerateKeyRequest, GenerateKeyResponse, KeyDetailsResponse};
pub use server::{
    bind_listener, build_router, serve, shutdown_signal, start_server, ApiError, AppState,
    RpcConfig, DEFAULT_BODY_LIMIT_BYTES, GENERIC_FAILURE, SERVICE_NAME,
};
