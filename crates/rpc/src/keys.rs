//! Key generation and lookup endpoints.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use chainkey_key_registry::{ChainMapping, UniqueKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::server::{ApiError, SharedState, GENERIC_FAILURE};

pub const MISSING_FIELDS: &str = "Address and chainName are required.";
pub const MAPPING_NOT_FOUND: &str = "Mapping not found for the provided unique key.";

/// Request to derive and register a key.
///
/// Both fields are optional at the wire level so that a missing or `null`
/// field is answered with the service's own 400.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyRequest {
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub chain_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyResponse {
    pub unique_key: UniqueKey,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDetailsResponse {
    pub unique_key: UniqueKey,
    pub mapping: ChainMapping,
}

/// POST /generate-key
pub async fn handle_generate_key(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<GenerateKeyResponse>, ApiError> {
    state.record_request();

    let request = read_request(&headers, body)?;
    let address = request.address.unwrap_or_default();
    let chain_name = request.chain_name.unwrap_or_default();

    let unique_key = state.registry.register(&address, &chain_name)?;
    info!(key = %unique_key, chain = %chain_name, "generated key");

    Ok(Json(GenerateKeyResponse { unique_key }))
}

/// GET /get-details/:uniqueKey
pub async fn handle_get_details(
    State(state): State<SharedState>,
    AxumPath(unique_key): AxumPath<String>,
) -> Result<Json<KeyDetailsResponse>, ApiError> {
    state.record_request();

    let unique_key = UniqueKey::from(unique_key);
    if !unique_key.is_well_formed() {
        debug!(key = %unique_key, "lookup for malformed key");
        return Err(ApiError::not_found(MAPPING_NOT_FOUND));
    }

    let entry = state.registry.lookup(&unique_key)?;
    Ok(Json(KeyDetailsResponse {
        unique_key: entry.key,
        mapping: entry.mapping,
    }))
}

/// Decode a generate-key body.
///
/// A body without a JSON content type, or an empty one, carries no fields.
/// A body that cannot be read (including one over the size limit) or parsed
/// is a generic failure.
fn read_request(
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<GenerateKeyRequest, ApiError> {
    if !has_json_content_type(headers) {
        debug!("generate-key body without JSON content type");
        return Err(ApiError::bad_request(MISSING_FIELDS));
    }

    let bytes = body.map_err(|err| {
        warn!("failed to read generate-key body: {err}");
        ApiError::internal(GENERIC_FAILURE)
    })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    }

    let Json(value) = Json::<Value>::from_bytes(&bytes).map_err(|err| {
        warn!("failed to parse generate-key body: {err}");
        ApiError::internal(GENERIC_FAILURE)
    })?;
    parse_request(value)
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Only objects and arrays are accepted at the top level. An array names no
/// fields, and a field that is not a string counts as missing.
fn parse_request(body: Value) -> Result<GenerateKeyRequest, ApiError> {
    match body {
        Value::Object(_) => serde_json::from_value(body).map_err(|err| {
            debug!("unusable generate-key fields: {err}");
            ApiError::bad_request(MISSING_FIELDS)
        }),
        Value::Array(_) => Err(ApiError::bad_request(MISSING_FIELDS)),
        other => {
            warn!("generate-key body is not an object or array: {other}");
            Err(ApiError::internal(GENERIC_FAILURE))
        }
    }
}
