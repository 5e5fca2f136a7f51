use std::{path::PathBuf, sync::Arc};

use lavender_config::Config;
use lavender_rewrite::{RewriteEngine, RewriteResult};
use parking_lot::RwLock;
use serde::Serialize;
use utoipa::ToSchema;

/// Shared by all handlers. Requests clone the current engine out of the lock,
/// so a reload never blocks or disturbs responses in flight.
#[derive(Debug)]
pub struct AppState {
    engine: RwLock<Arc<RewriteEngine>>,
    index_file: PathBuf,
    nodes_file: PathBuf,
    replicas: usize,
    context_path: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EngineInfo {
    pub version: String,
    pub labels: usize,
    pub replicas: usize,
    pub context_path: String,
    pub http_nodes: Vec<String>,
    pub https_nodes: Vec<String>,
}

impl AppState {
    pub fn load(config: &Config) -> RewriteResult<Self> {
        Self::open(
            config.index_file.clone(),
            config.nodes_file.clone(),
            config.replicas,
            config.context_path.clone(),
        )
    }

    pub fn open(
        index_file: PathBuf,
        nodes_file: PathBuf,
        replicas: usize,
        context_path: String,
    ) -> RewriteResult<Self> {
        let engine = RewriteEngine::load(&index_file, &nodes_file, replicas)?;
        Ok(Self {
            engine: RwLock::new(Arc::new(engine)),
            index_file,
            nodes_file,
            replicas,
            context_path,
        })
    }

    pub fn engine(&self) -> Arc<RewriteEngine> {
        self.engine.read().clone()
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Builds a new engine from the configured files and swaps it in. On
    /// failure the current engine stays active.
    pub fn reload(&self) -> RewriteResult<Arc<RewriteEngine>> {
        let engine = Arc::new(RewriteEngine::load(
            &self.index_file,
            &self.nodes_file,
            self.replicas,
        )?);
        *self.engine.write() = engine.clone();
        tracing::info!("rewrite engine reloaded with {} labels", engine.index().len());
        Ok(engine)
    }

    pub fn info(&self) -> EngineInfo {
        let engine = self.engine();
        EngineInfo {
            version: crate::LAVENDER_VERSION.to_string(),
            labels: engine.index().len(),
            replicas: engine.replicas(),
            context_path: self.context_path.clone(),
            http_nodes: engine.nodes().http.values().map(|u| u.to_string()).collect(),
            https_nodes: engine.nodes().https.values().map(|u| u.to_string()).collect(),
        }
    }
}
