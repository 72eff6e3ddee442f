use axum::body::Body;
use depot_blob::ByteStream;
use futures::TryStreamExt;

/// Stream a request body into the storage core without buffering it
pub fn body_stream(body: Body) -> ByteStream {
    Box::pin(body.into_data_stream().map_err(std::io::Error::other))
}
