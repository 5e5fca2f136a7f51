use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use crate::state::{AppState, EngineInfo};

/// Re-reads the index and node list, e.g. after a publish.
#[tracing::instrument(level = "info", skip(state))]
#[utoipa::path(
    tag = "admin",
    post,
    path = "/api/admin/reload",
    responses(
        (status = 200, description = "The engine was rebuilt", body = EngineInfo),
        (status = 500, description = "The index or node list could not be loaded; the previous engine stays active"),
    )
)]
pub(crate) async fn reload_engine(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EngineInfo>, (StatusCode, Json<String>)> {
    let reloaded = {
        let state = state.clone();
        tokio::task::spawn_blocking(move || state.reload().map(|_| ()))
            .await
            .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, Json(err.to_string())))?
    };
    reloaded.map_err(|err| {
        tracing::error!("Failed to reload rewrite engine: {}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(err.to_string()))
    })?;
    Ok(Json(state.info()))
}
