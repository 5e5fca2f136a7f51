use std::sync::Arc;

use axum::{extract::State, Json};

use crate::state::{AppState, EngineInfo};

#[tracing::instrument(level = "info", skip(state))]
#[utoipa::path(
    tag = "system",
    get,
    path = "/api/info",
    responses((status = 200, description = "Index and CDN nodes the rewrite engine currently uses", body = EngineInfo))
)]
pub(crate) async fn engine_info(State(state): State<Arc<AppState>>) -> Json<EngineInfo> {
    Json(state.info())
}
