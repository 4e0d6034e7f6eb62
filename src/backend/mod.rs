pub mod client;
pub mod error;
pub mod models;

use std::sync::{Arc, RwLock};

pub use client::BackendClient;
pub use models::VideoSummary;

/// Client handle shared between commands; swapped when settings change.
#[derive(Clone)]
pub struct SharedBackend {
    inner: Arc<RwLock<BackendClient>>,
}

impl SharedBackend {
    pub fn new(client: BackendClient) -> Self {
        Self {
            inner: Arc::new(RwLock::new(client)),
        }
    }

    pub fn current(&self) -> BackendClient {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, client: BackendClient) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = client;
    }
}
