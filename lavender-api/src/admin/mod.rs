use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::state::AppState;

pub(crate) mod reload;

#[derive(OpenApi)]
#[openapi()]
pub struct AdminApiDoc;

pub(crate) fn setup_admin_router() -> (Router<Arc<AppState>>, utoipa::openapi::OpenApi) {
    let (admin_router, admin_api) = OpenApiRouter::with_openapi(AdminApiDoc::openapi())
        .routes(routes!(reload::reload_engine))
        .split_for_parts();

    (admin_router, admin_api)
}
