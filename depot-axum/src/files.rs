use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use depot_blob::{Delivery, FileId, FilePut, MetadataPatch, OpenedBlob};
use serde::Deserialize;

use crate::body::body_stream;
use crate::views::{FileView, PatchFileMetadata, ReplaceFileMetadata};
use crate::{headers, DepotAxumError, DepotAxumState};

#[derive(Debug, Default, Deserialize)]
pub struct CreateFileQuery {
    pub name: Option<String>,
}

pub fn router() -> Router<DepotAxumState> {
    Router::new()
        .route("/", routing::get(list_files).post(create_file))
        .route(
            "/{id}",
            routing::get(get_file)
                .put(replace_metadata)
                .patch(patch_metadata)
                .delete(delete_file),
        )
        .route("/{id}/value", routing::get(get_value).put(replace_value))
}

async fn list_files(
    State(state): State<DepotAxumState>,
) -> Result<Json<Vec<FileView>>, DepotAxumError> {
    let records = state.blobs.list().await?;
    Ok(Json(records.into_iter().map(FileView::from).collect()))
}

async fn create_file(
    State(state): State<DepotAxumState>,
    Query(query): Query<CreateFileQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, DepotAxumError> {
    let mut put = FilePut::new(headers::content_type(&headers)?)
        .with_optional_name(query.name.filter(|name| !name.trim().is_empty()));
    if let Some(length) = headers::content_length(&headers)? {
        put = put.with_size_hint(length);
    }

    let record = state.blobs.put(put, body_stream(body)).await?;
    let location = format!("/files/{}", record.id);

    let mut response = (StatusCode::CREATED, Json(FileView::from(record))).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

async fn get_file(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
) -> Result<Json<FileView>, DepotAxumError> {
    let record = state.blobs.metadata(&FileId::parse(id)?).await?;
    Ok(Json(record.into()))
}

async fn replace_metadata(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
    data: Result<Json<ReplaceFileMetadata>, JsonRejection>,
) -> Result<Json<FileView>, DepotAxumError> {
    let id = FileId::parse(id)?;
    let Json(data) = data?;
    let record = state
        .blobs
        .replace_metadata(&id, data.name, data.media_type)
        .await?;
    Ok(Json(record.into()))
}

async fn patch_metadata(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
    data: Result<Json<PatchFileMetadata>, JsonRejection>,
) -> Result<Json<FileView>, DepotAxumError> {
    let id = FileId::parse(id)?;
    let Json(data) = data?;
    let patch = MetadataPatch {
        name: data.name,
        media_type: data.media_type,
    };
    let record = state.blobs.patch_metadata(&id, patch).await?;
    Ok(Json(record.into()))
}

async fn delete_file(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
) -> Result<StatusCode, DepotAxumError> {
    state.blobs.delete(&FileId::parse(id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_value(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, DepotAxumError> {
    let id = FileId::parse(id)?;
    let opened = state.blobs.open(&id, headers::range(&headers)).await?;
    Ok(content_response(opened))
}

async fn replace_value(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, DepotAxumError> {
    let id = FileId::parse(id)?;
    let media_type = headers::content_type(&headers)?;
    let length = headers::required_content_length(&headers)?;

    let put = FilePut::new(media_type).with_size_hint(length);
    state.blobs.replace(&id, put, body_stream(body)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn content_disposition(name: &str) -> Option<HeaderValue> {
    let name: String = name
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)).ok()
}

/// Render an opened file as a 200, 206 or 416 response
fn content_response(opened: OpenedBlob) -> Response {
    let accept_ranges = if opened.accepts_ranges { "bytes" } else { "none" };
    let media_type = HeaderValue::from_str(&opened.record.media_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, accept_ranges)
        .header(header::CONTENT_TYPE, media_type);
    if let Some(disposition) = opened.record.name.as_deref().and_then(content_disposition) {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    let built = match opened.delivery {
        Delivery::Full { stream, length } => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, length)
            .body(Body::from_stream(stream)),
        Delivery::Partial { stream, range } => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_LENGTH, range.content_length())
            .header(header::CONTENT_RANGE, range.content_range())
            .body(Body::from_stream(stream)),
        Delivery::NotSatisfiable { total_size } => {
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [
                    (header::CONTENT_RANGE, format!("bytes */{}", total_size)),
                    (header::ACCEPT_RANGES, accept_ranges.to_string()),
                ],
            )
                .into_response();
        }
    };

    built.unwrap_or_else(|e| {
        tracing::error!(file_id = %opened.record.id, error = %e, "failed to build content response");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}
