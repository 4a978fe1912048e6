use dd_cache::CoordinatorHandle;

/// Shared application state for all API routes.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: CoordinatorHandle,
}

impl ApiState {
    pub fn new(coordinator: CoordinatorHandle) -> Self {
        Self { coordinator }
    }
}
