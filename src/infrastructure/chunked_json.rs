// Chunked newline-delimited JSON streaming utilities
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Create a chunked response with one JSON document per line
pub fn chunked_json_stream<S>(stream: S) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let byte_stream = stream.map(|frame| Ok::<_, std::io::Error>(frame_chunk(&frame)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn frame_chunk(frame: &Bytes) -> Bytes {
    let mut chunk = BytesMut::with_capacity(frame.len() + 1);
    chunk.put_slice(frame);
    chunk.put_u8(b'\n');
    chunk.freeze()
}

/// Stream the current frame (if any) followed by every later one.
/// Frames a slow reader missed are skipped rather than ending the stream.
pub fn stream_from_receiver(first: Option<Bytes>, rx: broadcast::Receiver<Bytes>) -> impl IntoResponse {
    let stream = async_stream::stream! {
        if let Some(frame) = first {
            yield frame;
        }
        let mut updates = BroadcastStream::new(rx);
        while let Some(update) = updates.next().await {
            match update {
                Ok(frame) => yield frame,
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    tracing::debug!("Chart stream reader lagged, skipped {} frames", missed);
                }
            }
        }
    };

    match chunked_json_stream(stream) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
