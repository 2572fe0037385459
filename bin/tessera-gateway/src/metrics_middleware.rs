//! Metrics middleware for automatic S3 operation tracking
//!
//! Intercepts all requests and records metrics based on HTTP method, path
//! shape and query flags.

use axum::{body::Body, extract::Request, http::Method, middleware::Next, response::Response};
use tessera_s3::{OperationTimer, S3Operation, s3_metrics};

fn has_flag(query: Option<&str>, name: &str) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .any(|pair| pair.split('=').next() == Some(name))
    })
}

/// Map a request to the S3 operation it performs
fn classify(method: &Method, path: &str, query: Option<&str>) -> Option<S3Operation> {
    let segments: Vec<&str> = path
        .trim_start_matches('/')
        .splitn(2, '/')
        .filter(|s| !s.is_empty())
        .collect();
    let acl = has_flag(query, "acl");
    let upload_id = has_flag(query, "uploadId");

    let op = match (segments.as_slice(), method.as_str()) {
        ([_bucket], "PUT") if acl => S3Operation::PutBucketAcl,
        ([_bucket], "PUT") => S3Operation::CreateBucket,
        ([_bucket], "GET") if acl => S3Operation::GetBucketAcl,
        ([_bucket], "GET") if has_flag(query, "uploads") => S3Operation::ListMultipartUploads,
        ([_bucket], "GET") => S3Operation::ListObjects,

        ([_bucket, _key], "PUT") if acl => S3Operation::PutObjectAcl,
        ([_bucket, _key], "PUT") if upload_id => S3Operation::UploadPart,
        ([_bucket, _key], "PUT") => S3Operation::PutObject,
        ([_bucket, _key], "GET") if acl => S3Operation::GetObjectAcl,
        ([_bucket, _key], "GET") if upload_id => S3Operation::ListParts,
        ([_bucket, _key], "HEAD") => S3Operation::HeadObject,
        ([_bucket, _key], "POST") if upload_id => S3Operation::CompleteMultipartUpload,
        ([_bucket, _key], "POST") => S3Operation::InitiateMultipartUpload,
        ([_bucket, _key], "DELETE") if upload_id => S3Operation::AbortMultipartUpload,
        _ => return None,
    };
    Some(op)
}

fn content_length(headers: &axum::http::HeaderMap) -> u64 {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Metrics middleware that records S3 operation metrics
pub async fn metrics_layer(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path();

    // Skip metrics and health endpoints
    if path == "/metrics" || path == "/health" {
        return next.run(request).await;
    }

    let timer = classify(request.method(), path, request.uri().query())
        .map(|op| OperationTimer::new(op).with_request_bytes(content_length(request.headers())));

    s3_metrics().request_started();
    let response = next.run(request).await;
    s3_metrics().request_finished();

    if let Some(timer) = timer {
        timer.complete(response.status().as_u16(), content_length(response.headers()));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bucket_requests() {
        assert_eq!(
            classify(&Method::GET, "/bucket", None),
            Some(S3Operation::ListObjects)
        );
        assert_eq!(
            classify(&Method::GET, "/bucket", Some("uploads&max-uploads=2")),
            Some(S3Operation::ListMultipartUploads)
        );
        assert_eq!(
            classify(&Method::PUT, "/bucket", Some("acl")),
            Some(S3Operation::PutBucketAcl)
        );
        assert_eq!(classify(&Method::GET, "/", None), None);
    }

    #[test]
    fn test_classify_object_requests() {
        assert_eq!(
            classify(&Method::PUT, "/bucket/a/b", Some("partNumber=1&uploadId=x")),
            Some(S3Operation::UploadPart)
        );
        assert_eq!(
            classify(&Method::POST, "/bucket/a", Some("uploads")),
            Some(S3Operation::InitiateMultipartUpload)
        );
        assert_eq!(
            classify(&Method::GET, "/bucket/a", Some("acl")),
            Some(S3Operation::GetObjectAcl)
        );
        // Flags match whole parameter names
        assert_eq!(
            classify(&Method::PUT, "/bucket/a", Some("aclx=1")),
            Some(S3Operation::PutObject)
        );
    }
}
