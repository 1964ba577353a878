//! # np-api Handlers
//!
//! One set of handlers serves members, events and media events; each route
//! is instantiated for a concrete record type with its own service state.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use np_core::error::AppError;
use np_core::models::RecordId;
use np_core::traits::{Payload, Record};
use np_services::{Page, ResourceService};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::extract::Submission;

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

/// Serialized record plus `{asset field}_url`, the fetchable image URL.
pub fn view<R: Record>(service: &ResourceService<R>, record: &R) -> ApiResult<Value> {
    let mut value = serde_json::to_value(record).map_err(AppError::from)?;
    if let Value::Object(fields) = &mut value {
        fields.insert(
            format!("{}_url", R::ASSET_FIELD),
            Value::String(service.public_url(record)),
        );
    }
    Ok(value)
}

fn parse_id(raw: &str) -> ApiResult<RecordId> {
    Ok(RecordId::parse(raw)?)
}

fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    extracted
        .map(|Query(value)| value)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

/// GET /api/{resource}?skip=&limit=
pub async fn list<R: Record>(
    State(service): State<ResourceService<R>>,
    page: Result<Query<Page>, QueryRejection>,
) -> ApiResult<Json<Vec<Value>>> {
    let page = query(page)?;
    let records = service.list(page).await?;
    let views = records
        .iter()
        .map(|record| view(&service, record))
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(views))
}

/// GET /api/{resource}/{id}
pub async fn get<R: Record>(
    State(service): State<ResourceService<R>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = service.get(&parse_id(&id)?).await?;
    Ok(Json(view(&service, &record)?))
}

/// POST /api/{resource}
pub async fn create<R: Record>(
    State(service): State<ResourceService<R>>,
    submission: Submission<R::Draft>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let record = service.create(submission.payload, submission.upload).await?;
    Ok((StatusCode::CREATED, Json(view(&service, &record)?)))
}

/// PUT /api/{resource}/{id}
pub async fn update<R: Record>(
    State(service): State<ResourceService<R>>,
    Path(id): Path<String>,
    submission: Submission<R::Update>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let record = service
        .update(&id, submission.payload, submission.upload)
        .await?;
    Ok(Json(view(&service, &record)?))
}

/// PUT /api/{resource} with the id carried in the body
pub async fn update_by_body<R: Record>(
    State(service): State<ResourceService<R>>,
    submission: Submission<R::Update>,
) -> ApiResult<Json<Value>> {
    let id = submission
        .payload
        .requested_id()
        .cloned()
        .ok_or_else(|| AppError::validation("id is required"))?;
    let record = service
        .update(&id, submission.payload, submission.upload)
        .await?;
    Ok(Json(view(&service, &record)?))
}

/// DELETE /api/{resource}/{id}
pub async fn delete<R: Record>(
    State(service): State<ResourceService<R>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    remove(&service, &parse_id(&id)?).await
}

/// DELETE /api/{resource}?id=
pub async fn delete_by_query<R: Record>(
    State(service): State<ResourceService<R>>,
    params: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let id = query(params)?
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::validation("id is required"))?;
    remove(&service, &parse_id(&id)?).await
}

async fn remove<R: Record>(service: &ResourceService<R>, id: &RecordId) -> ApiResult<Json<Value>> {
    let removed = service.delete(id).await?;
    Ok(Json(json!({
        "message": format!("{} deleted successfully", R::KIND),
        "deleted": view(service, &removed)?,
    })))
}
