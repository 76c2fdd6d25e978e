//! Async runtime selection
//!
//! Sequencers spawn their dispatch worker on the ambient tokio runtime when
//! they are created inside one. Platform glue that constructs them from its
//! own callback threads (JNI, CoreBluetooth queues, WinRT thread pool) first
//! calls [`init_runtime`] to start a small process-wide runtime instead.

use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Errors creating a sequencer or its runtime
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error(
        "No async runtime: construct inside a tokio runtime or call runtime::init_runtime() first"
    )]
    NoRuntime,

    #[error("Failed to create runtime: {0}")]
    RuntimeInit(String),
}

/// Initialize the process-wide runtime (idempotent)
pub fn init_runtime() -> Result<Handle, SequencerError> {
    let runtime = RUNTIME.get_or_try_init(|| {
        // Two workers: one to drain sequencer queues, one spare for the host
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("quickble-worker")
            .enable_all()
            .build()
            .map_err(|e| SequencerError::RuntimeInit(e.to_string()))
    })?;
    Ok(runtime.handle().clone())
}

/// Handle to the process-wide runtime, if it has been initialized
pub fn global_handle() -> Option<Handle> {
    RUNTIME.get().map(|runtime| runtime.handle().clone())
}

/// Pick the runtime a new sequencer's worker should run on
pub(crate) fn resolve_handle() -> Result<Handle, SequencerError> {
    Handle::try_current()
        .ok()
        .or_else(global_handle)
        .ok_or(SequencerError::NoRuntime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_ambient_runtime() {
        assert!(resolve_handle().is_ok());
    }

    #[test]
    fn test_global_runtime_from_plain_thread() {
        init_runtime().expect("runtime should start");
        init_runtime().expect("init is idempotent");
        assert!(global_handle().is_some());

        std::thread::spawn(|| {
            let handle = resolve_handle().expect("falls back to global runtime");
            let value = handle.block_on(async { 7 });
            assert_eq!(value, 7);
        })
        .join()
        .unwrap();
    }
}
