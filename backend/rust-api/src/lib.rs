use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    let api = public_routes(app_state.clone())
        .merge(protected_routes(app_state.clone()))
        .merge(auth_routes(app_state.clone()));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1", api.layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Pages readable without logging in; a valid token still identifies the caller.
fn public_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/home", get(handlers::site::home))
        .route("/search", get(handlers::site::search))
        .route("/newsletter/subscribe", post(handlers::site::subscribe))
        .route("/courses", get(handlers::courses::catalog))
        .route("/courses/level/{level}", get(handlers::courses::by_level))
        .route("/courses/{id}", get(handlers::courses::detail))
        .route("/courses/{id}/lessons", get(handlers::lessons::list))
        .route(
            "/courses/{id}/lessons/{lesson_id}",
            get(handlers::lessons::detail),
        )
        .route("/accounts/users/{id}", get(handlers::accounts::public_profile))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::optional_auth_middleware,
        ))
}

fn protected_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Accounts
        .route("/accounts/dashboard", get(handlers::accounts::dashboard))
        .route(
            "/accounts/profile",
            get(handlers::accounts::get_profile).patch(handlers::accounts::update_profile),
        )
        .route(
            "/accounts/change-password",
            post(handlers::accounts::change_password),
        )
        .route("/accounts/deactivate", post(handlers::accounts::deactivate))
        // Courses
        .route("/courses", post(handlers::courses::create))
        .route("/courses/mine", get(handlers::courses::my_courses))
        .route("/courses/teaching", get(handlers::courses::instructor_courses))
        .route(
            "/courses/{id}",
            axum::routing::patch(handlers::courses::update).delete(handlers::courses::delete),
        )
        .route("/courses/{id}/enroll", post(handlers::courses::enroll))
        .route(
            "/courses/{id}/toggle-status",
            post(handlers::courses::toggle_status),
        )
        // Lessons
        .route("/courses/{id}/lessons", post(handlers::lessons::create))
        .route(
            "/courses/{id}/lessons/reorder",
            post(handlers::lessons::reorder),
        )
        .route(
            "/courses/{id}/lessons/{lesson_id}",
            axum::routing::patch(handlers::lessons::update).delete(handlers::lessons::delete),
        )
        .route("/lessons/{id}/complete", post(handlers::lessons::mark_complete))
        .route(
            "/lessons/{id}/progress",
            post(handlers::lessons::update_progress).delete(handlers::lessons::reset_progress),
        )
        // Quizzes
        .route(
            "/lessons/{id}/quizzes",
            get(handlers::quizzes::list).post(handlers::quizzes::create),
        )
        .route("/quizzes/results", get(handlers::quizzes::my_results))
        .route("/quizzes/{id}", get(handlers::quizzes::detail))
        .route("/quizzes/{id}/take", get(handlers::quizzes::take))
        .route("/quizzes/{id}/attempts", post(handlers::quizzes::submit))
        .route(
            "/quizzes/{id}/progress",
            get(handlers::quizzes::load_draft).post(handlers::quizzes::save_draft),
        )
        .route(
            "/quizzes/{id}/questions",
            post(handlers::quizzes::add_question),
        )
        .route(
            "/quizzes/{id}/statistics",
            get(handlers::quizzes::statistics),
        )
        .route("/questions/{id}", delete(handlers::quizzes::delete_question))
        .route("/attempts/{id}", get(handlers::quizzes::result))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let me_route = Router::new()
        .route("/auth/me", get(handlers::auth::get_current_user))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    register_route.merge(login_route).merge(me_route)
}
