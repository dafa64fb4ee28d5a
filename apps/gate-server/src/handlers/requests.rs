//! The gated operation.

use actix_web::{HttpResponse, web};
use turnstile_shared::ApiResponse;
use turnstile_shared::dto::IncrementResponse;

use crate::middleware::admission::AdmittedUser;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// Perform the gated operation and record it against the monthly quota.
///
/// POST /api/requests
pub async fn handle_request(
    state: web::Data<AppState>,
    admitted: Option<web::ReqData<AdmittedUser>>,
) -> AppResult<HttpResponse> {
    let Some(admitted) = admitted else {
        return Err(AppError::BadRequest(
            "X-User-Id header is required".to_string(),
        ));
    };
    let admitted = admitted.into_inner();

    // Charged only once the operation has succeeded.
    let count = state.ledger.increment_quota(&admitted.user_id, 1).await?;
    let limit = admitted.quota.limit;

    let response = IncrementResponse {
        user_id: admitted.user_id,
        tier: admitted.quota.tier,
        count,
        limit: i64::from(limit),
        remaining: limit.requests().map(|max| max.saturating_sub(count)),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(response)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{App, http::StatusCode, test};
    use async_trait::async_trait;
    use turnstile_core::ports::{CounterStore, KeyTtl, StoreError};
    use turnstile_infra::StaticTierResolver;

    use crate::config::AppConfig;
    use crate::handlers::configure_routes;
    use crate::middleware::admission::USER_ID_HEADER;
    use crate::state::AppState;

    /// Store whose every command fails, as during a Redis outage.
    struct DownStore;

    fn down() -> StoreError {
        StoreError::Connection("connection refused".to_string())
    }

    #[async_trait]
    impl CounterStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(down())
        }
        async fn incr_by(&self, _key: &str, _delta: i64) -> Result<i64, StoreError> {
            Err(down())
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
            Err(down())
        }
        async fn ttl(&self, _key: &str) -> Result<KeyTtl, StoreError> {
            Err(down())
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(down())
        }
        async fn set_nx_ex(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> Result<bool, StoreError> {
            Err(down())
        }
        async fn keys(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
            Err(down())
        }
        fn backend(&self) -> &'static str {
            "down"
        }
    }

    #[actix_web::test]
    async fn test_successful_request_is_counted() {
        let state = AppState::in_memory(
            &AppConfig::default(),
            Arc::new(StaticTierResolver::default()),
        );
        let app = test::init_service(
            App::new()
                .app_data(actix_web::web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        for expected in 1..=3u64 {
            let req = test::TestRequest::post()
                .uri("/api/requests")
                .insert_header((USER_ID_HEADER, "alice"))
                .to_request();
            let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

            assert_eq!(body["success"], true);
            assert_eq!(body["data"]["count"], expected);
            assert_eq!(body["data"]["tier"], "free");
            assert_eq!(body["data"]["limit"], 100);
            assert_eq!(body["data"]["remaining"], 100 - expected);
        }
    }

    #[actix_web::test]
    async fn test_store_outage_fails_open_then_503_on_record() {
        let state = AppState::with_store(
            &AppConfig::default(),
            Arc::new(DownStore),
            Arc::new(StaticTierResolver::default()),
        );
        let app = test::init_service(
            App::new()
                .app_data(actix_web::web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/requests")
            .insert_header((USER_ID_HEADER, "alice"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        // Admitted by the degraded check, but the charge cannot be recorded
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], 503);
    }
}
