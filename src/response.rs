//! Response construction for the stream service

use crate::error::{Result, StreamError};
use crate::models::ResolvedRange;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{
    HeaderValue, ACCEPT_RANGES, ALLOW, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RETRY_AFTER,
};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Body type of every response produced by the service
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Seconds a client is told to wait before retrying a not-ready asset
const RETRY_AFTER_SECS: &str = "5";

/// A body holding `data` in memory
pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body streaming everything `reader` yields
///
/// A read error ends the body with that error; hyper then aborts the
/// connection, which the client sees as a short body.
pub fn reader_body<R>(reader: R) -> ResponseBody
where
    R: AsyncRead + Send + 'static,
{
    let stream = ReaderStream::new(reader)
        .inspect_err(|e| warn!("Aborting response body: {}", e))
        .map_ok(Frame::data);
    StreamBody::new(stream).boxed_unsync()
}

/// Build status and headers for a stream response
///
/// # Returns
/// * 206 with `Content-Range` for a partial range
/// * 200 without `Content-Range` otherwise
///
/// Both carry `Content-Type`, `Content-Length` and `Accept-Ranges: bytes`.
pub fn stream_headers(content_type: &str, range: &ResolvedRange) -> Result<(StatusCode, HeaderMap)> {
    let mut headers = HeaderMap::new();

    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .map_err(|e| StreamError::HttpError(format!("Invalid header value: {}", e)))?,
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(range.length));
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let status = if range.partial {
        headers.insert(
            CONTENT_RANGE,
            HeaderValue::from_str(&range.content_range())
                .map_err(|e| StreamError::HttpError(format!("Invalid header value: {}", e)))?,
        );
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    debug!(
        "Built stream headers: status={}, length={}, range={:?}",
        status,
        range.length,
        headers.get(CONTENT_RANGE)
    );
    Ok((status, headers))
}

/// Assemble a response from parts
pub fn with_parts(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Convert an error into the response sent to the client
pub fn error_response(err: &StreamError) -> Response<ResponseBody> {
    let status =
        StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = text_response(status, err.to_string());
    let headers = response.headers_mut();

    match err {
        StreamError::UnsatisfiableRange { size, .. } => {
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                headers.insert(CONTENT_RANGE, value);
            }
        }
        StreamError::AssetNotReady(_) => {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        _ => {}
    }

    response
}

pub fn text_response(status: StatusCode, body: impl Into<String>) -> Response<ResponseBody> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    with_parts(status, headers, full_body(body.into()))
}

/// Serialize `value` as a JSON response, or a 500 if serialization fails
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(json) => {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            with_parts(status, headers, full_body(json))
        }
        Err(e) => error_response(&StreamError::InternalError(format!(
            "Failed to serialize response: {}",
            e
        ))),
    }
}

pub fn not_found_response() -> Response<ResponseBody> {
    text_response(StatusCode::NOT_FOUND, "404 Not Found")
}

pub fn method_not_allowed_response() -> Response<ResponseBody> {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET"));
    response
}
