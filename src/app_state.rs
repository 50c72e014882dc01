use std::path::PathBuf;
use std::sync::Arc;

use crate::services::{cache::ProductCache, coordinator::JobCoordinator};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<JobCoordinator>,
    pub cache: ProductCache,
    pub image_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(coordinator: JobCoordinator, cache: ProductCache, image_dir: PathBuf) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            cache,
            image_dir: Arc::new(image_dir),
        }
    }
}
