//! Record CRUD endpoints.

use std::collections::HashMap;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Serialize;

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::record::{ListQuery, NewRecord, RecordField, RecordPatch};
use crate::server::AppState;

const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Serialize)]
pub struct CreateRecordResponse {
    pub id: String,
}

/// Reject operations this deployment does not offer.
pub(crate) fn ensure_enabled(config: &ServiceConfig, operation: &str) -> Result<()> {
    if config
        .disabled_operations
        .iter()
        .any(|op| op.eq_ignore_ascii_case(operation))
    {
        return Err(ServiceError::Unimplemented(format!(
            "operation '{}' is not available",
            operation
        )));
    }
    Ok(())
}

fn invalid_body(rejection: JsonRejection) -> ServiceError {
    ServiceError::InvalidArgument(rejection.body_text())
}

/// POST /api/v1/records - Create a record
#[tracing::instrument(name = "http.create_record", skip(state, body))]
pub async fn create_record(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRecordResponse>)> {
    ensure_enabled(&state.settings.service, "create")?;
    let Json(attributes) = body.map_err(invalid_body)?;

    let id = state.store.create(attributes).await?;
    Ok((StatusCode::CREATED, Json(CreateRecordResponse { id })))
}

/// PATCH /api/v1/records/{id} - Update the supplied fields of a record
#[tracing::instrument(name = "http.patch_record", skip(state, body))]
pub async fn patch_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<RecordPatch>, JsonRejection>,
) -> Result<StatusCode> {
    ensure_enabled(&state.settings.service, "patch")?;
    let Json(patch) = body.map_err(invalid_body)?;

    state.store.patch(&id, patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/records/{id} - Delete a record
#[tracing::instrument(name = "http.delete_record", skip(state))]
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    ensure_enabled(&state.settings.service, "delete")?;

    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/v1/records/ - No id in the path
pub async fn patch_record_without_id(State(state): State<AppState>) -> Result<StatusCode> {
    ensure_enabled(&state.settings.service, "patch")?;
    state.store.patch("", RecordPatch::default()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/records/ - No id in the path
pub async fn delete_record_without_id(State(state): State<AppState>) -> Result<StatusCode> {
    ensure_enabled(&state.settings.service, "delete")?;
    state.store.delete("").await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/records - One page of records as newline-delimited JSON.
///
/// `page` and `page_size` select the window; every other query parameter is
/// an equality filter on the column of the same name.
#[tracing::instrument(name = "http.list_records", skip(state))]
pub async fn list_records(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    ensure_enabled(&state.settings.service, "list")?;
    let query = parse_list_query(&state.settings.service, params)?;

    let records = state.store.list(query).await?;
    let lines = records.map(|record| {
        serde_json::to_vec(&record).map(|mut line| {
            line.push(b'\n');
            Bytes::from(line)
        })
    });

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

fn parse_list_query(config: &ServiceConfig, mut params: HashMap<String, String>) -> Result<ListQuery> {
    let page = parse_number(params.remove("page"), "page", 1)?;
    let page_size = parse_number(params.remove("page_size"), "page_size", config.default_page_size)?;

    if page < 1 {
        return Err(ServiceError::InvalidArgument(
            "'page' must be at least 1".to_string(),
        ));
    }
    if page_size < 1 || page_size > config.max_page_size {
        return Err(ServiceError::InvalidArgument(format!(
            "'page_size' must be between 1 and {}",
            config.max_page_size
        )));
    }

    let mut query = ListQuery::new(page, page_size);
    for (key, value) in params {
        let field: RecordField = key
            .parse()
            .map_err(|e: crate::record::UnknownField| ServiceError::InvalidArgument(e.to_string()))?;
        query = query.filter(field, value);
    }
    Ok(query)
}

fn parse_number(value: Option<String>, name: &str, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ServiceError::InvalidArgument(format!("invalid '{}' value '{}'", name, raw))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_query_defaults() {
        let config = ServiceConfig::default();
        let query = parse_list_query(&config, HashMap::new()).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 50);
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_list_query_filters() {
        let config = ServiceConfig::default();
        let query = parse_list_query(
            &config,
            params(&[("page", "2"), ("page_size", "10"), ("country", "UK")]),
        )
        .unwrap();
        assert_eq!(query.offset(), 10);
        assert_eq!(query.filters.get(&RecordField::Country).map(String::as_str), Some("UK"));
    }

    #[test]
    fn test_list_query_rejects_bad_input() {
        let config = ServiceConfig::default();
        for bad in [
            params(&[("page", "0")]),
            params(&[("page", "-1")]),
            params(&[("page_size", "0")]),
            params(&[("page_size", "1001")]),
            params(&[("page", "abc")]),
            params(&[("shoe_size", "42")]),
        ] {
            assert!(matches!(
                parse_list_query(&config, bad),
                Err(ServiceError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_disabled_operations() {
        let config = ServiceConfig {
            disabled_operations: vec!["Delete".to_string()],
            ..Default::default()
        };
        assert!(ensure_enabled(&config, "create").is_ok());
        assert!(matches!(
            ensure_enabled(&config, "delete"),
            Err(ServiceError::Unimplemented(_))
        ));
    }
}
