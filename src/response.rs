use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
        }
    }
}

/// Envelope returned by every endpoint. On failure `error` carries the
/// detail and `data` is absent; successful responses omit `error`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            error: None,
            data: Some(data),
            meta,
        }
    }

    pub fn paginated(message: impl Into<String>, data: T, page: i64, per_page: i64, total: i64) -> Self {
        Self::success(message, data, Some(Meta::new(page, per_page, total)))
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Some(message.clone()),
            message,
            data: None,
            meta: Some(Meta::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_omits_the_error_field() {
        let body = ApiResponse::success("OK", 7, Some(Meta::empty()));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"], 7);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_carries_detail_and_no_data() {
        let body = ApiResponse::<()>::error("Not Found");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Not Found");
        assert_eq!(json["data"], serde_json::Value::Null);
    }

    #[test]
    fn paginated_fills_the_meta_block() {
        let body = ApiResponse::paginated("Ok", vec![1, 2], 2, 20, 41);
        let meta = body.meta.expect("meta");
        assert_eq!(meta.page, Some(2));
        assert_eq!(meta.per_page, Some(20));
        assert_eq!(meta.total, Some(41));
    }
}
