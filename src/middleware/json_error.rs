use axum::{
    body::{Bytes, to_bytes},
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    error::AppError,
    response::{JsonApiResponse, log_app_error},
};

const MAX_ERROR_BODY_BYTES: usize = 16 * 1024;

/// Rewrites plain-text error bodies (extractor rejections, 404s from the
/// router) into the JSON envelope. Browsers asking for HTML are left alone.
pub async fn json_error_middleware(req: Request, next: Next) -> Response {
    let wants_html = accepts(&req, "text/html");
    let response = next.run(req).await;
    let status = response.status();

    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }
    if wants_html || content_type_contains(response.headers(), &["json", "text/html"]) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let message = match to_bytes(body, MAX_ERROR_BODY_BYTES).await {
        Ok(bytes) => message_from_body(status, bytes),
        Err(_) => default_message(status),
    };
    let app_error = app_error_from_status(status, message);
    if status.is_server_error() {
        log_app_error(&app_error, status);
    }

    let mut body = JsonApiResponse::from_error(&app_error);
    body.status = status.as_u16();
    let mut rewritten = body.into_response();
    for (name, value) in &parts.headers {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rewritten.headers_mut().append(name.clone(), value.clone());
        }
    }
    rewritten
}

fn accepts(req: &Request, mime: &str) -> bool {
    req.headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains(mime))
}

fn content_type_contains(headers: &HeaderMap, needles: &[&str]) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_ascii_lowercase)
        .is_some_and(|value| needles.iter().any(|needle| value.contains(needle)))
}

fn message_from_body(status: StatusCode, bytes: Bytes) -> String {
    let message = String::from_utf8_lossy(&bytes).trim().to_string();
    if message.is_empty() {
        default_message(status)
    } else {
        message
    }
}

fn default_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
}

fn app_error_from_status(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED => AppError::unauthorized(message),
        StatusCode::FORBIDDEN => AppError::forbidden(message),
        StatusCode::NOT_FOUND => AppError::not_found(message),
        StatusCode::CONFLICT => AppError::conflict(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::too_many_requests(message),
        StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => AppError::upstream(message),
        _ if status.is_client_error() => AppError::validation(message),
        _ => AppError::internal(message),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::app_error_from_status;
    use crate::error::AppError;

    #[test]
    fn statuses_map_to_matching_variants() {
        assert!(matches!(
            app_error_from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad".into()),
            AppError::Validation(_)
        ));
        assert!(matches!(
            app_error_from_status(StatusCode::METHOD_NOT_ALLOWED, "nope".into()),
            AppError::Validation(_)
        ));
        assert!(matches!(
            app_error_from_status(StatusCode::SERVICE_UNAVAILABLE, "down".into()),
            AppError::Internal(_)
        ));
    }
}
