//! Model Registry
//!
//! Lazily loads heavyweight read-only artifacts by name and shares them by
//! reference. Concurrent first requests for a name wait on a single load; a
//! failed load is reported to every waiter and is not cached.

mod loader;

pub use loader::FileModelLoader;

use crate::error::WardenError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An immutable loaded artifact
pub struct Model {
    pub name: String,
    pub artifact: Vec<u8>,
    pub loaded_at: DateTime<Utc>,
}

impl Model {
    pub fn new(name: impl Into<String>, artifact: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            artifact,
            loaded_at: Utc::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.artifact.len()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("size", &self.artifact.len())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Shared handle to a loaded model. All holders see the same artifact.
pub type ModelHandle = Arc<Model>;

/// Source of model artifacts
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, name: &str) -> anyhow::Result<Model>;
}

type LoadFuture = Shared<BoxFuture<'static, Result<ModelHandle, String>>>;

enum Slot {
    Ready(ModelHandle),
    Loading { attempt: u64, future: LoadFuture },
}

/// Name-keyed cache of loaded models
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<String, Slot>>,
    next_attempt: AtomicU64,
    loads_started: Arc<AtomicU64>,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
            next_attempt: AtomicU64::new(1),
            loads_started: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a model, loading it on first use.
    pub async fn get(&self, name: &str) -> Result<ModelHandle, WardenError> {
        let (attempt, future) = {
            let mut slots = self.slots.lock();
            match slots.get(name) {
                Some(Slot::Ready(handle)) => return Ok(Arc::clone(handle)),
                Some(Slot::Loading { attempt, future }) => {
                    debug!(model = name, "Waiting on in-flight model load");
                    (*attempt, future.clone())
                }
                None => {
                    let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                    let future = self.start_load(name);
                    slots.insert(
                        name.to_string(),
                        Slot::Loading {
                            attempt,
                            future: future.clone(),
                        },
                    );
                    (attempt, future)
                }
            }
        };

        let result = future.await;

        {
            let mut slots = self.slots.lock();
            let still_current = matches!(
                slots.get(name),
                Some(Slot::Loading { attempt: current, .. }) if *current == attempt
            );
            if still_current {
                match &result {
                    Ok(handle) => {
                        slots.insert(name.to_string(), Slot::Ready(Arc::clone(handle)));
                    }
                    Err(_) => {
                        slots.remove(name);
                    }
                }
            }
        }

        result.map_err(|cause| WardenError::ModelLoadFailed {
            name: name.to_string(),
            cause,
        })
    }

    fn start_load(&self, name: &str) -> LoadFuture {
        let loader = Arc::clone(&self.loader);
        let loads_started = Arc::clone(&self.loads_started);
        let name = name.to_string();

        async move {
            loads_started.fetch_add(1, Ordering::SeqCst);
            info!(model = %name, "Loading model");
            match loader.load(&name).await {
                Ok(model) => {
                    info!(model = %name, size = model.size(), "Model loaded");
                    Ok(Arc::new(model))
                }
                Err(e) => {
                    warn!(model = %name, error = %format!("{:#}", e), "Model load failed");
                    Err(format!("{:#}", e))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Whether a completed load for `name` is cached
    pub fn is_cached(&self, name: &str) -> bool {
        matches!(self.slots.lock().get(name), Some(Slot::Ready(_)))
    }

    /// Names with a completed load
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of load invocations started since creation
    pub fn loads_started(&self) -> u64 {
        self.loads_started.load(Ordering::SeqCst)
    }
}
