use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use depot_blob::{BlobError, SegmentUpload, SessionId, UploadProgress, UploadSession};

use crate::body::body_stream;
use crate::views::{CreateUploadSession, UploadSessionView};
use crate::{headers, DepotAxumError, DepotAxumState};

pub fn router() -> Router<DepotAxumState> {
    Router::new()
        .route("/", routing::get(list_sessions).post(create_session))
        .route("/{id}", routing::get(get_session).delete(delete_session))
        .route("/{id}/value", routing::put(upload_segment))
}

/// Attach progress and, once finished, the assembled file
async fn session_view(
    state: &DepotAxumState,
    session: UploadSession,
) -> Result<UploadSessionView, DepotAxumError> {
    let progress = state.blobs.upload_progress(&session.id).await?;
    let uploaded_file = if session.is_finished() {
        Some(state.blobs.metadata(&session.file_id).await?)
    } else {
        None
    };
    Ok(UploadSessionView::new(session, progress, uploaded_file))
}

async fn list_sessions(
    State(state): State<DepotAxumState>,
) -> Result<Json<Vec<UploadSessionView>>, DepotAxumError> {
    let mut views = Vec::new();
    for session in state.blobs.upload_sessions().await? {
        match session_view(&state, session).await {
            Ok(view) => views.push(view),
            // expired or deleted between listing and loading
            Err(DepotAxumError::Blob(e))
                if e.is_not_found() || matches!(e, BlobError::SessionExpired { .. }) =>
            {
                continue
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Json(views))
}

async fn create_session(
    State(state): State<DepotAxumState>,
    body: Bytes,
) -> Result<Response, DepotAxumError> {
    let request: CreateUploadSession = if body.iter().all(u8::is_ascii_whitespace) {
        CreateUploadSession::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            DepotAxumError::bad_request(format!("Failed to parse the request body as JSON: {}", e))
        })?
    };

    let file_name = request.file_name.filter(|name| !name.trim().is_empty());
    let session = state.blobs.begin_upload(file_name).await?;
    let location = format!("/upload-sessions/{}", session.id);
    // nothing received yet; a zero ttl session must still be reported
    let view = UploadSessionView::new(session, UploadProgress::default(), None);

    let mut response = (StatusCode::CREATED, Json(view)).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

async fn get_session(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
) -> Result<Json<UploadSessionView>, DepotAxumError> {
    let session = state.blobs.upload_session(&SessionId::parse(id)?).await?;
    Ok(Json(session_view(&state, session).await?))
}

async fn delete_session(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
) -> Result<StatusCode, DepotAxumError> {
    state.blobs.delete_upload(&SessionId::parse(id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accept one chunk: `Content-Type`, `Content-Length` and
/// `Content-Range: bytes <from>-<to>/<total>` describe it.
async fn upload_segment(
    State(state): State<DepotAxumState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, DepotAxumError> {
    let session_id = SessionId::parse(id)?;
    let media_type = headers::content_type(&headers)?;
    let length = headers::required_content_length(&headers)?;
    let position = headers::content_range(&headers)?;

    if position.from > position.to {
        return Err(DepotAxumError::bad_request(format!(
            "Content-Range start {} is after its end {}",
            position.from, position.to
        )));
    }
    let declared = position.to - position.from + 1;
    if length != declared {
        return Err(DepotAxumError::bad_request(format!(
            "Content-Length {} does not match the {} bytes of Content-Range",
            length, declared
        )));
    }

    let segment = SegmentUpload::new(media_type, position.from, position.to, position.total);
    let session = state
        .blobs
        .upload_segment(&session_id, segment, body_stream(body))
        .await?;

    let status = if session.is_finished() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    let view = session_view(&state, session).await?;
    Ok((status, Json(view)).into_response())
}
