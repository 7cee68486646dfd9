use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::metrics::{track_cache_operation, RATE_LIMITED_TOTAL};
use crate::services::AppState;

/// A fixed-window limit applied per client IP.
#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub scope: &'static str,
    pub limit: u32,
    pub window_seconds: u64,
    /// Env var that overrides `limit`.
    pub limit_env: &'static str,
}

pub const LOGIN_RULE: RateRule = RateRule {
    scope: "login",
    limit: 10,
    window_seconds: 300,
    limit_env: "RATE_LIMIT_LOGIN_ATTEMPTS",
};

pub const REGISTER_RULE: RateRule = RateRule {
    scope: "register",
    limit: 5,
    window_seconds: 3600,
    limit_env: "RATE_LIMIT_REGISTER_ATTEMPTS",
};

const FIXED_WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                if let Some(val) = part.trim().strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

fn rate_limit_disabled() -> bool {
    std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1"
}

async fn enforce(
    redis: Option<&ConnectionManager>,
    rule: RateRule,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(redis) = redis else {
        return Ok(next.run(request).await);
    };
    if rate_limit_disabled() {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    let limit = std::env::var(rule.limit_env)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(rule.limit);

    let allowed = check_rate_limit(
        redis,
        &format!("ratelimit:{}:{}", rule.scope, client_ip),
        limit,
        rule.window_seconds,
    )
    .await
    .map_err(|e| {
        tracing::error!("{} rate limit check failed: {}", rule.scope, e);
        ApiError::internal("Internal server error")
    })?;

    if !allowed {
        RATE_LIMITED_TOTAL.with_label_values(&[rule.scope]).inc();
        tracing::warn!("{} rate limit exceeded for IP: {}", rule.scope, client_ip);
        return Err(ApiError::too_many_requests(
            "Too many attempts, please try again later",
        ));
    }

    Ok(next.run(request).await)
}

/// Allows 10 login attempts per 5 minutes per IP.
pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(state.redis.as_ref(), LOGIN_RULE, request, next).await
}

/// Allows 5 registrations per hour per IP.
pub async fn register_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(state.redis.as_ref(), REGISTER_RULE, request, next).await
}

/// Atomic fixed-window counter in Redis.
async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let allowed: u32 = track_cache_operation(
        "rate_limit",
        redis::Script::new(FIXED_WINDOW_SCRIPT)
            .key(key)
            .arg(limit)
            .arg(window_seconds)
            .invoke_async(&mut conn),
    )
    .await?;

    Ok(allowed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_client_ip_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "1.2.3.4");
    }

    #[test]
    fn test_extract_client_ip_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("forwarded", "for=5.6.7.8;proto=http".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "5.6.7.8");
    }

    #[test]
    fn test_extract_client_ip_connectinfo() {
        let headers = HeaderMap::new();
        let mut exts = axum::http::Extensions::new();
        exts.insert(ConnectInfo::<SocketAddr>("7.7.7.7:1234".parse().unwrap()));
        assert_eq!(extract_client_ip_from(&headers, &exts), "7.7.7.7");
    }

    #[test]
    fn test_extract_client_ip_unknown() {
        let headers = HeaderMap::new();
        let exts = axum::http::Extensions::new();
        assert_eq!(extract_client_ip_from(&headers, &exts), "unknown");
    }

    #[test]
    fn auth_rules_match_documented_windows() {
        assert_eq!((LOGIN_RULE.limit, LOGIN_RULE.window_seconds), (10, 300));
        assert_eq!((REGISTER_RULE.limit, REGISTER_RULE.window_seconds), (5, 3600));
    }
}
