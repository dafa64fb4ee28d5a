//! Usage read endpoint.

use actix_web::{HttpResponse, web};
use turnstile_core::UsageSummary;
use turnstile_shared::ApiResponse;
use turnstile_shared::dto::UsageResponse;

use crate::state::AppState;

/// Current month's consumption of a user.
///
/// GET /api/usage/{user_id}
pub async fn get_usage(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let user_id = path.into_inner();
    let summary = state.ledger.usage(&user_id).await;

    HttpResponse::Ok().json(ApiResponse::ok(to_response(summary)))
}

fn to_response(summary: UsageSummary) -> UsageResponse {
    UsageResponse {
        user_id: summary.user_id,
        tier: summary.tier,
        tier_label: summary.tier_label,
        month: summary.month,
        current: summary.current,
        limit: i64::from(summary.limit),
        remaining: summary.remaining,
        percentage: summary.percentage,
        reset_at: summary.reset_at,
        degraded: summary.degraded,
    }
}
