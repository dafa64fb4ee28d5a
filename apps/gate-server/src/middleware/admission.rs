//! Admission middleware: local burst guard, then the monthly quota check.
//!
//! The caller is identified by the `X-User-Id` header, which an upstream
//! authentication layer is expected to set. Requests without it are limited
//! per peer address and skip the quota check.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    web,
};
use turnstile_core::{AdmissionResult, QuotaCheck};
use turnstile_shared::ErrorResponse;

use crate::state::AppState;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const OPERATION_CLASS_HEADER: &str = "X-Operation-Class";
const DEFAULT_OPERATION_CLASS: &str = "default";

/// Identified caller admitted by the middleware, with its quota decision.
#[derive(Debug, Clone)]
pub struct AdmittedUser {
    pub user_id: String,
    pub quota: QuotaCheck,
}

/// Admission middleware factory. Reads [`AppState`] from app data.
pub struct AdmissionMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AdmissionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AdmissionMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AdmissionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
                tracing::error!("AppState missing, admitting request unchecked");
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            };

            let user_id = header_value(&req, USER_ID_HEADER);
            // Classes without a configured limit share the default window.
            let operation_class = header_value(&req, OPERATION_CLASS_HEADER)
                .map(|c| c.to_lowercase())
                .filter(|c| state.guard.config().limits.contains_key(c))
                .unwrap_or_else(|| DEFAULT_OPERATION_CLASS.to_string());
            let subject = match &user_id {
                Some(id) => format!("user:{id}"),
                None => format!(
                    "ip:{}",
                    req.connection_info()
                        .realip_remote_addr()
                        .unwrap_or("unknown")
                ),
            };

            let admission = state.guard.check_local_limit(&subject, &operation_class);
            if !admission.allowed {
                tracing::warn!(
                    subject = %subject,
                    operation = %operation_class,
                    limit = admission.limit,
                    "Local rate limit exceeded"
                );

                let retry_after = retry_after_secs(admission.reset_in);
                let mut response = HttpResponse::TooManyRequests()
                    .insert_header(("Retry-After", retry_after.to_string()))
                    .json(ErrorResponse::too_many_requests(retry_after));
                rate_limit_headers(response.headers_mut(), &admission);

                return Ok(req.into_response(response).map_into_right_body());
            }

            let admitted = match user_id {
                Some(user_id) => {
                    let tier = state.ledger.user_tier(&user_id).await;
                    let quota = state.ledger.check_quota(&user_id, &tier).await;
                    if !quota.allowed {
                        tracing::info!(
                            user_id = %user_id,
                            tier = %quota.tier,
                            current = quota.current,
                            "Monthly quota exceeded"
                        );

                        let retry_after = retry_after_secs(quota.reset_in);
                        let detail = format!(
                            "{} of {} monthly requests used on the {} plan",
                            quota.current,
                            i64::from(quota.limit),
                            quota.tier
                        );
                        let mut response = HttpResponse::TooManyRequests()
                            .insert_header(("Retry-After", retry_after.to_string()))
                            .json(ErrorResponse::quota_exceeded(detail, retry_after));
                        rate_limit_headers(response.headers_mut(), &admission);
                        quota_headers(response.headers_mut(), &quota);

                        return Ok(req.into_response(response).map_into_right_body());
                    }

                    Some(AdmittedUser { user_id, quota })
                }
                None => None,
            };

            tracing::debug!(subject = %subject, operation = %operation_class, "Request admitted");

            if let Some(admitted) = &admitted {
                req.extensions_mut().insert(admitted.clone());
            }

            let mut res = service.call(req).await?;
            rate_limit_headers(res.headers_mut(), &admission);
            if let Some(admitted) = &admitted {
                quota_headers(res.headers_mut(), &admitted.quota);
            }

            Ok(res.map_into_left_body())
        })
    }
}

fn header_value(req: &ServiceRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Whole seconds, rounded up so a client never retries too early.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 { secs + 1 } else { secs }
}

fn rate_limit_headers(headers: &mut HeaderMap, admission: &AdmissionResult) {
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(admission.limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(admission.remaining),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-reset"),
        HeaderValue::from(retry_after_secs(admission.reset_in)),
    );
}

fn quota_headers(headers: &mut HeaderMap, quota: &QuotaCheck) {
    headers.insert(
        HeaderName::from_static("x-quota-limit"),
        HeaderValue::from(i64::from(quota.limit)),
    );
    headers.insert(
        HeaderName::from_static("x-quota-used"),
        HeaderValue::from(quota.current),
    );
    if let Some(max) = quota.limit.requests() {
        headers.insert(
            HeaderName::from_static("x-quota-remaining"),
            HeaderValue::from(max.saturating_sub(quota.current)),
        );
    }
    headers.insert(
        HeaderName::from_static("x-quota-reset"),
        HeaderValue::from(quota.reset_at.timestamp()),
    );
}
