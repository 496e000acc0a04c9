// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    unauthorized      = { CourierError::Unauthorized, 401, "UNAUTHORIZED" },
    bad_request       = { CourierError::BadRequest, 400, "BAD_REQUEST" },
    permission_denied = { CourierError::PermissionDenied, 403, "PERMISSION_DENIED" },
    store_unavailable = { CourierError::StoreUnavailable, 503, "STORE_UNAVAILABLE" },
    internal          = { CourierError::Internal, 500, "INTERNAL" },
)]
fn status_and_code(err: CourierError, status: u16, code: &str) {
    assert_eq!(err.http_status(), status);
    assert_eq!(err.as_str(), code);
    assert_eq!(err.to_string(), code);
}

#[test]
fn response_body_shape() -> anyhow::Result<()> {
    let (status, Json(body)) = CourierError::PermissionDenied.to_http_response("invalid ticket");
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        serde_json::to_value(&body)?,
        serde_json::json!({"error": {"code": "PERMISSION_DENIED", "message": "invalid ticket"}})
    );
    Ok(())
}
