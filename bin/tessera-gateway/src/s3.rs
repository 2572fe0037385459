//! S3 API handlers
//!
//! Thin HTTP adapters over [`S3Service`]: they pick the operation from the
//! method and query flags, lift ACL headers and bodies out of the request,
//! and render results or errors as S3 XML.

use axum::{
    Extension,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tessera_auth::{AclHeaders, Requester, is_acl_header};
use tessera_common::{Error, Result};
use tessera_s3::records::quote_etag;
use tessera_s3::xml;
use tessera_s3::{AclInput, ListObjectsQuery, ListPartsQuery, ListUploadsQuery, S3Service};
use tracing::error;
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub service: S3Service,
}

/// Query flags that select the sub-resource of a request
#[derive(Debug, Deserialize, Default)]
pub struct SubResource {
    pub acl: Option<String>,
    pub uploads: Option<String>,
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(rename = "partNumber")]
    pub part_number: Option<String>,
}

/// Render an error as an S3 `<Error>` document
pub fn error_response(err: &Error, resource: &str) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(resource, "Request failed: {}", err);
    }
    let request_id = Uuid::new_v4().to_string();
    let body = xml::error_document(err, Some(resource), &request_id);
    build(
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/xml")
            .header("x-amz-request-id", request_id),
        Body::from(body),
    )
}

fn build(builder: axum::http::response::Builder, body: Body) -> Response {
    builder.body(body).unwrap_or_else(|e| {
        error!("Failed to build response: {}", e);
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

fn xml_response(xml: String) -> Response {
    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/xml"),
        Body::from(xml),
    )
}

fn empty_response(status: StatusCode) -> Response {
    build(Response::builder().status(status), Body::empty())
}

/// Collapse an operation result into a response
fn respond(result: Result<Response>, resource: &str) -> Response {
    result.unwrap_or_else(|e| error_response(&e, resource))
}

/// ACL headers of a request; their values must be valid UTF-8
fn acl_headers(headers: &HeaderMap) -> Result<AclHeaders> {
    let mut pairs = Vec::new();
    for (name, value) in headers {
        if !is_acl_header(name.as_str()) {
            continue;
        }
        let value = value
            .to_str()
            .map_err(|_| Error::invalid_argument(format!("{name} header is not valid UTF-8")))?;
        pairs.push((name.as_str(), value));
    }
    Ok(AclHeaders::from_pairs(pairs))
}

/// ACL headers plus the body, for `?acl` requests
fn acl_input(headers: &HeaderMap, body: &Bytes) -> Result<AclInput> {
    Ok(AclInput::from_headers(acl_headers(headers)?).with_body(body.to_vec()))
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn http_date(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Health check
pub async fn health_check() -> Response {
    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain"),
        Body::from("OK"),
    )
}

// =========== Bucket routes ===========

/// `PUT /{bucket}` (create) and `PUT /{bucket}?acl`
pub async fn put_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(sub): Query<SubResource>,
    Extension(requester): Extension<Requester>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let resource = format!("/{bucket}");
    let result = if sub.acl.is_some() {
        match acl_input(&headers, &body) {
            Ok(input) => state
                .service
                .put_bucket_acl(&requester, &bucket, &input)
                .await
                .map(|()| empty_response(StatusCode::OK)),
            Err(e) => Err(e),
        }
    } else {
        // A CreateBucketConfiguration body is not an ACL
        match acl_headers(&headers) {
            Ok(acl) => state
                .service
                .create_bucket(&requester, &bucket, &AclInput::from_headers(acl))
                .await
                .map(|record| {
                    build(
                        Response::builder()
                            .status(StatusCode::OK)
                            .header(header::LOCATION, format!("/{}", record.name)),
                        Body::empty(),
                    )
                }),
            Err(e) => Err(e),
        }
    };
    respond(result, &resource)
}

/// `GET /{bucket}`, `GET /{bucket}?acl` and `GET /{bucket}?uploads`
pub async fn get_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(sub): Query<SubResource>,
    Query(objects): Query<ListObjectsQuery>,
    Query(uploads): Query<ListUploadsQuery>,
    Extension(requester): Extension<Requester>,
) -> Response {
    let resource = format!("/{bucket}");
    let service = &state.service;
    let result = if sub.acl.is_some() {
        match service.get_bucket_acl(&requester, &bucket).await {
            Ok(policy) => xml::access_control_policy(&policy).map(xml_response),
            Err(e) => Err(e),
        }
    } else if sub.uploads.is_some() {
        match service
            .list_multipart_uploads(&requester, &bucket, &uploads)
            .await
        {
            Ok(listing) => xml::list_uploads_result(&listing).map(xml_response),
            Err(e) => Err(e),
        }
    } else {
        match service.list_objects(&requester, &bucket, &objects).await {
            Ok(listing) => xml::list_objects_result(&listing).map(xml_response),
            Err(e) => Err(e),
        }
    };
    respond(result, &resource)
}

// =========== Object routes ===========

/// `PUT /{bucket}/{key}`: object put, `?acl`, or `?partNumber=&uploadId=`
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(sub): Query<SubResource>,
    Extension(requester): Extension<Requester>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let resource = format!("/{bucket}/{key}");
    let service = &state.service;

    let result = if sub.acl.is_some() {
        match acl_input(&headers, &body) {
            Ok(input) => service
                .put_object_acl(&requester, &bucket, &key, &input)
                .await
                .map(|()| empty_response(StatusCode::OK)),
            Err(e) => Err(e),
        }
    } else if let Some(upload_id) = sub.upload_id {
        match sub.part_number.as_deref().map(str::parse::<u32>) {
            Some(Ok(part_number)) => service
                .upload_part(&requester, &bucket, &key, &upload_id, part_number, &body)
                .await
                .map(|part| {
                    build(
                        Response::builder()
                            .status(StatusCode::OK)
                            .header(header::ETAG, quote_etag(&part.etag)),
                        Body::empty(),
                    )
                }),
            _ => Err(Error::invalid_argument("partNumber must be an integer")),
        }
    } else {
        match acl_headers(&headers) {
            Ok(acl) => service
                .put_object(
                    &requester,
                    &bucket,
                    &key,
                    &body,
                    content_type(&headers),
                    &AclInput::from_headers(acl),
                )
                .await
                .map(|object| {
                    build(
                        Response::builder()
                            .status(StatusCode::OK)
                            .header(header::ETAG, quote_etag(&object.etag)),
                        Body::empty(),
                    )
                }),
            Err(e) => Err(e),
        }
    };
    respond(result, &resource)
}

/// `GET /{bucket}/{key}?acl` and `GET /{bucket}/{key}?uploadId=` (list parts)
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(sub): Query<SubResource>,
    Query(parts): Query<ListPartsQuery>,
    Extension(requester): Extension<Requester>,
) -> Response {
    let resource = format!("/{bucket}/{key}");
    let service = &state.service;

    let result = if sub.acl.is_some() {
        match service.get_object_acl(&requester, &bucket, &key).await {
            Ok(policy) => xml::access_control_policy(&policy).map(xml_response),
            Err(e) => Err(e),
        }
    } else if let Some(upload_id) = sub.upload_id {
        match service
            .list_parts(&requester, &bucket, &key, &upload_id, &parts)
            .await
        {
            Ok(listing) => xml::list_parts_result(&listing).map(xml_response),
            Err(e) => Err(e),
        }
    } else {
        Err(Error::invalid_argument(
            "object data is not served; use HEAD for metadata",
        ))
    };
    respond(result, &resource)
}

/// `HEAD /{bucket}/{key}`
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Extension(requester): Extension<Requester>,
) -> Response {
    let resource = format!("/{bucket}/{key}");
    let result = state
        .service
        .head_object(&requester, &bucket, &key)
        .await
        .map(|object| {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::ETAG, quote_etag(&object.etag))
                .header(header::CONTENT_LENGTH, object.size)
                .header(header::LAST_MODIFIED, http_date(&object.last_modified))
                .header("x-amz-storage-class", object.storage_class);
            if let Some(content_type) = object.content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type);
            }
            build(builder, Body::empty())
        });
    respond(result, &resource)
}

/// `POST /{bucket}/{key}?uploads` (initiate) and `?uploadId=` (complete)
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(sub): Query<SubResource>,
    Extension(requester): Extension<Requester>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let resource = format!("/{bucket}/{key}");
    let service = &state.service;

    let result = if sub.uploads.is_some() {
        let initiated = match acl_headers(&headers) {
            Ok(acl) => {
                service
                    .initiate_multipart_upload(
                        &requester,
                        &bucket,
                        &key,
                        content_type(&headers),
                        &AclInput::from_headers(acl),
                    )
                    .await
            }
            Err(e) => Err(e),
        };
        match initiated {
            Ok(upload) => {
                xml::initiate_multipart_upload_result(&bucket, &upload.key, &upload.upload_id)
                    .map(xml_response)
            }
            Err(e) => Err(e),
        }
    } else if let Some(upload_id) = sub.upload_id {
        let completed = match xml::parse_complete_multipart_upload(&body) {
            Ok(parts) => {
                service
                    .complete_multipart_upload(&requester, &bucket, &key, &upload_id, &parts)
                    .await
            }
            Err(e) => Err(e),
        };
        completed.and_then(|object| {
            xml::complete_multipart_upload_result(
                &resource,
                &bucket,
                &object.key,
                &object.etag,
            )
            .map(xml_response)
        })
    } else {
        Err(Error::invalid_argument(
            "POST request must include ?uploads or ?uploadId parameter",
        ))
    };
    respond(result, &resource)
}

/// `DELETE /{bucket}/{key}?uploadId=` (abort)
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(sub): Query<SubResource>,
    Extension(requester): Extension<Requester>,
) -> Response {
    let resource = format!("/{bucket}/{key}");
    let result = match sub.upload_id {
        Some(upload_id) => state
            .service
            .abort_multipart_upload(&requester, &bucket, &key, &upload_id)
            .await
            .map(|()| empty_response(StatusCode::NO_CONTENT)),
        None => Err(Error::invalid_argument(
            "DELETE is only supported with ?uploadId",
        )),
    };
    respond(result, &resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_error_response_status() {
        let response = error_response(&Error::AccessDenied, "/bucket");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );

        let response = error_response(&Error::BucketNotFound("b".into()), "/b");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_acl_input_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-acl", "public-read".parse().unwrap());
        headers.insert("content-type", "text/plain".parse().unwrap());
        let input = acl_input(&headers, &Bytes::from_static(b"<x/>")).unwrap();
        assert_eq!(input.headers.canned.as_deref(), Some("public-read"));
        assert!(!input.headers.has_grants());
        assert_eq!(input.body, b"<x/>");
    }

    #[test]
    fn test_acl_header_must_be_utf8() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-amz-grant-read",
            HeaderValue::from_bytes(b"id=\"\xff\"").unwrap(),
        );
        assert!(matches!(acl_headers(&headers), Err(Error::InvalidArgument(_))));

        // Other headers with opaque bytes are not inspected
        let mut headers = HeaderMap::new();
        headers.insert("x-custom", HeaderValue::from_bytes(b"\xff").unwrap());
        assert!(acl_headers(&headers).unwrap().is_empty());
    }

    #[test]
    fn test_http_date() {
        use chrono::TimeZone;
        let ts = chrono::Utc.with_ymd_and_hms(2010, 11, 10, 20, 48, 33).unwrap();
        assert_eq!(http_date(&ts), "Wed, 10 Nov 2010 20:48:33 GMT");
    }
}
