//! # Driver Warnings
//!
//! Task-local warning collection for best-effort cleanup paths.
//!
//! Output deletion and cancel-on-interrupt must never abort the caller's
//! flow, so their failures degrade to warnings. This module lets an
//! embedder collect those warnings per task and surface them alongside
//! the primary result.

use std::future::Future;
use std::sync::{Arc, Mutex};

tokio::task_local! {
    pub static DRIVER_WARNINGS: Arc<Mutex<Vec<String>>>;
}

/// Add a warning to the current task's warning list, if a scope is active.
pub fn add_warning(warning: String) {
    if let Ok(warnings) = DRIVER_WARNINGS.try_with(|w: &Arc<Mutex<Vec<String>>>| w.clone()) {
        if let Ok(mut lock) = warnings.lock() {
            lock.push(warning);
        }
    }
}

/// Run a future with a fresh warning scope and return its output together
/// with every warning raised while it ran.
pub async fn with_warning_scope<F, T>(fut: F) -> (T, Vec<String>)
where
    F: Future<Output = T>,
{
    let sink = Arc::new(Mutex::new(Vec::new()));
    let out = DRIVER_WARNINGS.scope(sink.clone(), fut).await;
    let warnings = sink.lock().map(|w| w.clone()).unwrap_or_default();
    (out, warnings)
}
