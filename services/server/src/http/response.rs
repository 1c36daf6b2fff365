use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt::Display;
use tl_protocol::HttpErrorEnvelope;

pub type HttpResponse = Response;
pub type HttpResult<T = ()> = Result<T, HttpResponse>;

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        err.to_string(),
    )
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn unauthorized(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

pub fn forbidden(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::FORBIDDEN, "FORBIDDEN", message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn conflict(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::CONFLICT, "CONFLICT", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(
        response: Response,
        expected_status: StatusCode,
        expected_code: &str,
        expected_message: &str,
    ) {
        assert_eq!(response.status(), expected_status);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: HttpErrorEnvelope =
            serde_json::from_slice(&body).expect("response body should be valid error json");

        assert_eq!(parsed.code, expected_code);
        assert_eq!(parsed.message, expected_message);
        assert_eq!(parsed.details, None);
    }

    #[tokio::test]
    async fn internal_error_sets_internal_contract() {
        let response = internal_error("database unavailable");
        assert_error_response(
            response,
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "database unavailable",
        )
        .await;
    }

    #[tokio::test]
    async fn bad_request_sets_bad_request_contract() {
        let response = bad_request("invalid body");
        assert_error_response(response, StatusCode::BAD_REQUEST, "BAD_REQUEST", "invalid body")
            .await;
    }

    #[tokio::test]
    async fn unauthorized_sets_unauthorized_contract() {
        let response = unauthorized("missing bearer token");
        assert_error_response(
            response,
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "missing bearer token",
        )
        .await;
    }

    #[tokio::test]
    async fn forbidden_sets_forbidden_contract() {
        let response = forbidden("not a member of this project");
        assert_error_response(
            response,
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "not a member of this project",
        )
        .await;
    }

    #[tokio::test]
    async fn not_found_sets_not_found_contract() {
        let response = not_found("task not found");
        assert_error_response(response, StatusCode::NOT_FOUND, "NOT_FOUND", "task not found")
            .await;
    }

    #[tokio::test]
    async fn conflict_sets_conflict_contract() {
        let response = conflict("already a member");
        assert_error_response(response, StatusCode::CONFLICT, "CONFLICT", "already a member")
            .await;
    }
}
