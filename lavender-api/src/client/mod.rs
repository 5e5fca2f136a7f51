use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::state::AppState;

pub(crate) mod info;
pub(crate) mod rewrite;

#[derive(utoipa::OpenApi)]
#[openapi()]
pub struct ClientApiDoc;

pub(crate) fn setup_client_router() -> (Router<Arc<AppState>>, utoipa::openapi::OpenApi) {
    let (client_router, client_api) = OpenApiRouter::with_openapi(ClientApiDoc::openapi())
        .routes(routes!(rewrite::rewrite_html))
        .routes(routes!(rewrite::rewrite_css))
        .routes(routes!(info::engine_info))
        .split_for_parts();

    (client_router, client_api)
}
