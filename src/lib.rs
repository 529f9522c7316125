pub mod auth;
pub mod booking;
pub mod config;
pub mod error;
pub mod flash;
pub mod model;
pub mod pages;
pub mod payment;
pub mod report;
pub mod room;
pub mod schema;
pub mod seed;
pub mod user;
pub mod validate;

use std::sync::Arc;

use auth::SecurityAddon;
use casbin::{CoreApi, Enforcer};
use chrono::Duration;
use diesel::pg::Pg;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use jsonwebtoken::{DecodingKey, EncodingKey};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub const AUTH_TAG: &str = "auth";
pub const ROOM_TAG: &str = "room";
pub const BOOKING_TAG: &str = "booking";
pub const PAYMENT_TAG: &str = "payment";
pub const REPORT_TAG: &str = "report";

pub type Pool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

pub struct Keys {
    encoding_session_key: EncodingKey,
    decoding_session_key: DecodingKey,
}

impl Keys {
    pub fn new(session_key: &str) -> Self {
        Self {
            encoding_session_key: EncodingKey::from_secret(session_key.as_bytes()),
            decoding_session_key: DecodingKey::from_secret(session_key.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct State {
    pub pool: Pool,
    pub enforcer: Arc<Enforcer>,
    pub keys: Arc<Keys>,
    pub session_ttl: Duration,
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    tags(
        (name = AUTH_TAG, description = "Session token endpoints"),
        (name = ROOM_TAG, description = "Room management endpoints"),
        (name = BOOKING_TAG, description = "Booking workflow endpoints"),
        (name = PAYMENT_TAG, description = "Payment endpoints"),
        (name = REPORT_TAG, description = "Dashboard statistics")
    )
)]
struct ApiDoc;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_migrations(
    connection: &mut impl MigrationHarness<Pg>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    connection.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Pool that opens connections on first use.
pub fn lazy_pool(db_url: impl Into<String>) -> Pool {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    bb8::Pool::builder().build_unchecked(config)
}

pub async fn load_enforcer(
    model: &'static str,
    policy: &'static str,
) -> Result<Enforcer, casbin::Error> {
    Enforcer::new(model, policy).await
}

fn api_router() -> OpenApiRouter<State> {
    OpenApiRouter::new()
        .merge(user::auth_router())
        .merge(room::room_router())
        .merge(booking::booking_router())
        .merge(payment::payment_router())
        .merge(report::stats_router())
}

/// Full HTTP surface: JSON API under `/api`, page routes, swagger UI.
pub fn app(state: State) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api", api_router())
        .with_state(state.clone())
        .split_for_parts();

    router
        .merge(pages::page_router().with_state(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/apidoc/openapi.json", api))
}
