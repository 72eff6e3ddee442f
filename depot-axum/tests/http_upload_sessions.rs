use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use depot_axum::depot;
use depot_blob::{BlobAdapter, BlobConfig, MemoryContentStore, MemoryUploadSessionStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    depot(BlobAdapter::new(
        MemoryContentStore::new(),
        MemoryUploadSessionStore::new(),
        BlobConfig::default(),
    ))
    .router()
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn open_session(app: &Router, body: Body) -> Value {
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-sessions")
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let location = res.headers()["location"].to_str().unwrap().to_string();
    let view = json_body(res).await;
    assert_eq!(location, format!("/upload-sessions/{}", view["id"].as_str().unwrap()));
    view
}

fn chunk(session: &str, range: &str, data: &'static str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/upload-sessions/{}/value", session))
        .header("content-type", "text/plain")
        .header("content-length", data.len())
        .header("content-range", range)
        .body(Body::from(data))
        .unwrap()
}

#[tokio::test]
async fn chunks_assemble_into_a_file() {
    let app = app();
    let session = open_session(&app, Body::from(json!({"fileName": "greeting.txt"}).to_string())).await;
    assert_eq!(session["status"], "open");
    assert_eq!(session["fileName"], "greeting.txt");
    assert_eq!(session["missingRanges"], json!([]));
    let id = session["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(chunk(&id, "bytes 6-10/11", "world"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let view = json_body(res).await;
    assert_eq!(view["status"], "active");
    assert_eq!(view["fileSize"], 11);
    assert_eq!(view["fileMediaType"], "text/plain");
    assert_eq!(view["receivedBytes"], 5);
    assert_eq!(view["missingRanges"], json!([{"from": 0, "to": 5}]));
    assert!(view.get("uploadedFile").is_none());

    let res = app
        .clone()
        .oneshot(chunk(&id, "bytes 0-5/11", "hello "))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view = json_body(res).await;
    assert_eq!(view["status"], "finished");
    assert_eq!(view["receivedBytes"], 11);
    assert_eq!(view["uploadedFile"]["name"], "greeting.txt");
    assert_eq!(view["uploadedFile"]["size"], 11);
    let file_id = view["fileId"].as_str().unwrap().to_string();
    assert_eq!(view["uploadedFile"]["id"], file_id.as_str());

    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/files/{}/value", file_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello world");
}

#[tokio::test]
async fn empty_create_body_is_accepted() {
    let app = app();
    let session = open_session(&app, Body::empty()).await;
    assert_eq!(session["fileName"], Value::Null);

    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/upload-sessions/{}", session["id"].as_str().unwrap()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "open");
}

#[tokio::test]
async fn malformed_create_body_is_rejected() {
    let res = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-sessions")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overlapping_chunk_is_rejected() {
    let app = app();
    let session = open_session(&app, Body::empty()).await;
    let id = session["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(chunk(&id, "bytes 0-4/11", "hello"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let res = app
        .clone()
        .oneshot(chunk(&id, "bytes 3-7/11", "lo wo"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["name"], "BadRequest");

    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/upload-sessions/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(res).await["receivedBytes"], 5);
}

#[tokio::test]
async fn chunk_headers_are_validated() {
    let app = app();
    let session = open_session(&app, Body::empty()).await;
    let uri = format!("/upload-sessions/{}/value", session["id"].as_str().unwrap());

    let no_type = Request::builder()
        .method("PUT")
        .uri(&uri)
        .header("content-length", "5")
        .header("content-range", "bytes 0-4/11")
        .body(Body::from("hello"))
        .unwrap();
    let res = app.clone().oneshot(no_type).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let no_length = Request::builder()
        .method("PUT")
        .uri(&uri)
        .header("content-type", "text/plain")
        .header("content-range", "bytes 0-4/11")
        .body(Body::from("hello"))
        .unwrap();
    let res = app.clone().oneshot(no_length).await.unwrap();
    assert_eq!(res.status(), StatusCode::LENGTH_REQUIRED);

    let bad_range = Request::builder()
        .method("PUT")
        .uri(&uri)
        .header("content-type", "text/plain")
        .header("content-length", "5")
        .header("content-range", "items 0-4/11")
        .body(Body::from("hello"))
        .unwrap();
    let res = app.clone().oneshot(bad_range).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let mismatched = Request::builder()
        .method("PUT")
        .uri(&uri)
        .header("content-type", "text/plain")
        .header("content-length", "5")
        .header("content-range", "bytes 0-5/11")
        .body(Body::from("hello"))
        .unwrap();
    let res = app.clone().oneshot(mismatched).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(
            Request::builder()
                .uri(uri.trim_end_matches("/value"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let view = json_body(res).await;
    assert_eq!(view["status"], "open");
    assert_eq!(view["receivedBytes"], 0);
}

#[tokio::test]
async fn media_type_must_match_the_first_chunk() {
    let app = app();
    let session = open_session(&app, Body::empty()).await;
    let id = session["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(chunk(&id, "bytes 0-4/11", "hello"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let other = Request::builder()
        .method("PUT")
        .uri(format!("/upload-sessions/{}/value", id))
        .header("content-type", "application/json")
        .header("content-length", "6")
        .header("content-range", "bytes 5-10/11")
        .body(Body::from(" world"))
        .unwrap();
    let res = app.oneshot(other).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sessions_are_listed_and_deleted() {
    let app = app();
    let first = open_session(&app, Body::empty()).await;
    let second = open_session(&app, Body::empty()).await;

    let res = app
        .clone()
        .oneshot(Request::builder().uri("/upload-sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed = json_body(res).await;
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first["id"].as_str().unwrap()));
    assert!(ids.contains(&second["id"].as_str().unwrap()));

    let uri = format!("/upload-sessions/{}", first["id"].as_str().unwrap());
    let res = app
        .clone()
        .oneshot(Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .clone()
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(res).await["className"], "not-found");

    let res = app
        .oneshot(chunk(first["id"].as_str().unwrap(), "bytes 0-4/11", "hello"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_sessions_answer_gone() {
    let config = BlobConfig::default().with_session_ttl(std::time::Duration::ZERO);
    let app = depot(BlobAdapter::new(
        MemoryContentStore::new(),
        MemoryUploadSessionStore::new(),
        config,
    ))
    .router();
    let session = open_session(&app, Body::empty()).await;
    let id = session["id"].as_str().unwrap().to_string();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let res = app
        .clone()
        .oneshot(chunk(&id, "bytes 0-4/5", "hello"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::GONE);
    assert_eq!(json_body(res).await["name"], "Gone");

    let res = app
        .oneshot(Request::builder().uri("/upload-sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(res).await, json!([]));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let res = app()
        .oneshot(chunk("doesnotexist", "bytes 0-4/5", "hello"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn charset_parameters_do_not_change_the_media_type() {
    let app = app();
    let session = open_session(&app, Body::empty()).await;
    let id = session["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(chunk(&id, "bytes 0-4/11", "hello"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let with_charset = Request::builder()
        .method("PUT")
        .uri(format!("/upload-sessions/{}/value", id))
        .header("content-type", "text/plain; charset=utf-8")
        .header("content-length", "6")
        .header("content-range", "bytes 5-10/11")
        .body(Body::from(" world"))
        .unwrap();
    let res = app.oneshot(with_charset).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view = json_body(res).await;
    assert_eq!(view["fileMediaType"], "text/plain");
    assert_eq!(view["uploadedFile"]["mediaType"], "text/plain");
}
