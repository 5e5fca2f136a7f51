use std::{io::Write, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use lavender_rewrite::{CssProcessor, HtmlProcessor, ProcessorWriter, RewriteEngine};
use serde::Deserialize;
use url::Url;
use utoipa::IntoParams;

use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RewriteParams {
    /// URL the document is served from; relative references resolve against it.
    base: String,
    /// Overrides the configured context path.
    context_path: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Document {
    Html,
    Css,
}

impl Document {
    fn content_type(self) -> &'static str {
        match self {
            Document::Html => "text/html",
            Document::Css => "text/css",
        }
    }

    /// Bytes that are not part of a rewritten reference are returned as
    /// they came, whatever the document's charset.
    fn rewrite(
        self,
        engine: &RewriteEngine,
        base: &Url,
        context_path: &str,
        body: &[u8],
    ) -> std::io::Result<Vec<u8>> {
        let rewriter = engine.bind(base, context_path);
        let out = Vec::with_capacity(body.len());
        match self {
            Document::Html => {
                let mut writer = ProcessorWriter::new(HtmlProcessor::new(&rewriter, out));
                writer.write_all(body)?;
                Ok(writer.finish()?.into_inner())
            }
            Document::Css => {
                let mut writer = ProcessorWriter::new(CssProcessor::new(&rewriter, out));
                writer.write_all(body)?;
                Ok(writer.finish()?.into_inner())
            }
        }
    }
}

async fn rewrite_document(
    state: Arc<AppState>,
    params: RewriteParams,
    body: Bytes,
    document: Document,
) -> Result<Response, (StatusCode, Json<String>)> {
    let base = Url::parse(&params.base).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(format!("Invalid base URL `{}`: {}", params.base, err)),
        )
    })?;
    let context_path = params
        .context_path
        .unwrap_or_else(|| state.context_path().to_string());
    let engine = state.engine();

    let rewritten = tokio::task::spawn_blocking(move || {
        document.rewrite(&engine, &base, &context_path, &body)
    })
    .await
    .map_err(|err| {
        tracing::error!("Rewrite task failed: {}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(err.to_string()))
    })?
    .map_err(|err| {
        tracing::error!("Error rewriting document: {}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(err.to_string()))
    })?;

    Ok(([(header::CONTENT_TYPE, document.content_type())], rewritten).into_response())
}

#[tracing::instrument(level = "info", skip(state, body))]
#[utoipa::path(
    tag = "rewrite",
    post,
    path = "/api/rewrite/html",
    params(RewriteParams),
    request_body(content = String, content_type = "text/html"),
    responses(
        (status = 200, description = "The document with references to published resources pointing at the CDN"),
        (status = 400, description = "Invalid base URL"),
    )
)]
pub(crate) async fn rewrite_html(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RewriteParams>,
    body: Bytes,
) -> Result<Response, (StatusCode, Json<String>)> {
    rewrite_document(state, params, body, Document::Html).await
}

#[tracing::instrument(level = "info", skip(state, body))]
#[utoipa::path(
    tag = "rewrite",
    post,
    path = "/api/rewrite/css",
    params(RewriteParams),
    request_body(content = String, content_type = "text/css"),
    responses(
        (status = 200, description = "The stylesheet with url() references pointing at the CDN"),
        (status = 400, description = "Invalid base URL"),
    )
)]
pub(crate) async fn rewrite_css(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RewriteParams>,
    body: Bytes,
) -> Result<Response, (StatusCode, Json<String>)> {
    rewrite_document(state, params, body, Document::Css).await
}
