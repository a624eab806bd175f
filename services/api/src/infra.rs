use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use vos_dispatch::logistics::{DispatchMode, DispatchService, MemoryStore};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// The process-local fleet store. Records live as long as the server does.
pub(crate) fn in_memory_dispatch(mode: DispatchMode) -> Arc<DispatchService<MemoryStore>> {
    Arc::new(DispatchService::new(Arc::new(MemoryStore::default()), mode))
}
