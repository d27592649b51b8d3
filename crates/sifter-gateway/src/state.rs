use sifter_pipeline::JobRunner;

/// Shared application state for axum handlers.
pub struct AppState {
    pub runner: JobRunner,
}
