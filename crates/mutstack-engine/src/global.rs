//! Optional process-wide registration of one engine for external callers.

use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::engine::MutationEngine;
use crate::error::{EngineError, EngineResult};

static ENGINE: OnceLock<Arc<MutationEngine>> = OnceLock::new();

/// Register `engine` as the process-wide engine. Succeeds once.
pub fn install(engine: Arc<MutationEngine>) -> EngineResult<()> {
    ENGINE.set(engine).map_err(|_| EngineError::AlreadyInstalled)?;
    info!("mutation engine installed");
    Ok(())
}

/// The installed engine, if any.
pub fn installed() -> Option<Arc<MutationEngine>> {
    ENGINE.get().cloned()
}
