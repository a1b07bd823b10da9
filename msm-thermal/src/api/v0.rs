//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! until the daemon reaches 1.0.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::api_client::types::{ConfigPatchRequest, ConfigValue, ControllerStatus, SetValueRequest};
use crate::thermal::{ConfigError, ConfigKey, ThermalConfig};
use crate::tracing::prelude::*;

type ApiError = (StatusCode, String);

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_status))
        .routes(routes!(get_config, patch_config))
        .routes(routes!(get_value, put_value))
}

fn rejected(e: ConfigError) -> ApiError {
    let status = match e {
        ConfigError::UnknownKey(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, e.to_string())
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return the latest controller status snapshot.
#[utoipa::path(
    get,
    path = "/status",
    tag = "status",
    responses(
        (status = OK, description = "Current controller status", body = ControllerStatus),
    ),
)]
async fn get_status(State(state): State<SharedState>) -> Json<ControllerStatus> {
    Json(state.status())
}

/// Return the full thermal configuration.
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    responses(
        (status = OK, description = "Current configuration", body = ThermalConfig),
    ),
)]
async fn get_config(State(state): State<SharedState>) -> Json<ThermalConfig> {
    Json(state.config.snapshot())
}

/// Update several values at once.
///
/// The update is all-or-nothing: if any key is unknown or the result breaks
/// the band ordering, nothing changes.
#[utoipa::path(
    patch,
    path = "/config",
    tag = "config",
    request_body = ConfigPatchRequest,
    responses(
        (status = OK, description = "Updated configuration", body = ThermalConfig),
        (status = NOT_FOUND, description = "Unknown configuration key"),
        (status = UNPROCESSABLE_ENTITY, description = "Resulting configuration is invalid"),
    ),
)]
async fn patch_config(
    State(state): State<SharedState>,
    Json(req): Json<ConfigPatchRequest>,
) -> Result<Json<ThermalConfig>, ApiError> {
    let updated = state
        .config
        .update(|config| {
            for (name, &value) in &req.values {
                config.set(ConfigKey::from_name(name)?, value)?;
            }
            Ok(())
        })
        .map_err(rejected)?;

    info!(values = ?req.values, "Thermal configuration updated");
    Ok(Json(updated))
}

/// Return one configuration value by name.
#[utoipa::path(
    get,
    path = "/config/{key}",
    tag = "config",
    params(
        ("key" = String, Path, description = "Configuration key, e.g. allowed_max_high"),
    ),
    responses(
        (status = OK, description = "Current value", body = ConfigValue),
        (status = NOT_FOUND, description = "Unknown configuration key"),
    ),
)]
async fn get_value(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<Json<ConfigValue>, ApiError> {
    let key = ConfigKey::from_name(&key).map_err(rejected)?;
    Ok(Json(ConfigValue {
        key,
        value: state.config.get(key),
    }))
}

/// Set one configuration value by name.
#[utoipa::path(
    put,
    path = "/config/{key}",
    tag = "config",
    params(
        ("key" = String, Path, description = "Configuration key, e.g. allowed_max_high"),
    ),
    request_body = SetValueRequest,
    responses(
        (status = OK, description = "Value after the update", body = ConfigValue),
        (status = NOT_FOUND, description = "Unknown configuration key"),
        (status = UNPROCESSABLE_ENTITY, description = "Resulting configuration is invalid"),
    ),
)]
async fn put_value(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(req): Json<SetValueRequest>,
) -> Result<Json<ConfigValue>, ApiError> {
    let key = ConfigKey::from_name(&key).map_err(rejected)?;
    let updated = state.config.set(key, req.value).map_err(rejected)?;

    info!(%key, value = req.value, "Thermal configuration updated");
    Ok(Json(ConfigValue {
        key,
        value: updated.get(key),
    }))
}
