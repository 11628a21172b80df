//! Success envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// `{ "success": true, "message"?: ..., ...data }`.
///
/// `data` is flattened into the envelope, so it must serialize as a map
/// (a struct or `serde_json::Value::Object`).
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    data: T,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with `data`.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
            status: StatusCode::OK,
        }
    }

    /// 201 with `data`.
    #[must_use]
    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }

    /// Attach a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<serde_json::Map<String, serde_json::Value>> {
    /// 200 carrying only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(serde_json::Map::new()).with_message(message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Created {
        post_id: &'static str,
    }

    #[test]
    fn data_is_flattened_into_envelope() {
        let response = ApiResponse::created(Created { post_id: "p1" }).with_message("Post created");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "success": true, "message": "Post created", "postId": "p1" })
        );
        assert_eq!(response.into_response().status(), StatusCode::CREATED);
    }

    #[test]
    fn message_only_envelope() {
        let json = serde_json::to_value(ApiResponse::message("Logged out")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "message": "Logged out" }));
    }
}
