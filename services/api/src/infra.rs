use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tutor_select::config::EngineConfig;
use tutor_select::error::AppError;
use tutor_select::workflows::selection::{
    seed, MemoryDatabase, MemoryUserDirectory, SelectionEngine,
};

pub(crate) type Engine = SelectionEngine<MemoryDatabase, MemoryUserDirectory>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory stores, optionally hydrated from CSV, wrapped in an engine.
pub(crate) fn seeded_engine(
    config: EngineConfig,
    applications_csv: Option<&Path>,
    users_csv: Option<&Path>,
) -> Result<Arc<Engine>, AppError> {
    let database = Arc::new(MemoryDatabase::new());
    let users = Arc::new(MemoryUserDirectory::default());
    seed::load(&database, &users, applications_csv, users_csv)?;
    Ok(Arc::new(SelectionEngine::new(database, users, config)))
}
