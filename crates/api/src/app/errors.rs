use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use referly_infra::{AdRedirectError, AttachmentError, LedgerError, StoreError};

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::DuplicateCode => {
            json_error(StatusCode::CONFLICT, "conflict", "referral code already in use")
        }
        StoreError::Unavailable(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
        StoreError::Malformed(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn attachment_error_to_response(err: AttachmentError) -> axum::response::Response {
    match err {
        AttachmentError::UnknownAccount => {
            json_error(StatusCode::NOT_FOUND, "not_found", "unknown account")
        }
        AttachmentError::CodeAllocation => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "code_allocation",
            "could not allocate a unique referral code",
        ),
        AttachmentError::Storage(e) => store_error_to_response(e),
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        // The provider treats any 4xx as terminal; signature and payload
        // failures must not be retried, storage failures must be.
        LedgerError::Unauthenticated => {
            json_error(StatusCode::BAD_REQUEST, "invalid_signature", "signature rejected")
        }
        LedgerError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        LedgerError::Storage(e) => store_error_to_response(e),
    }
}

pub fn redirect_error_to_response(err: AdRedirectError) -> axum::response::Response {
    match err {
        AdRedirectError::NotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "ad or target not found")
        }
        AdRedirectError::Storage(e) => store_error_to_response(e),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
