//! Per-instance dispatch worker
//!
//! Queue mutations happen under the owner's lock and only *schedule* work
//! here; the worker task then hands units to the transport and delivers
//! completions to the owner outside that lock. Both kinds of command share
//! one channel, so the owner observes completions in exactly the order they
//! were resolved, and a transport that completes synchronously from inside
//! `begin_*` re-enters the owner without deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Work scheduled for the worker
#[derive(Debug)]
pub(crate) enum Command<U, E> {
    /// Hand this unit to the transport
    Dispatch(U),
    /// Deliver this completion to the owner
    Deliver(E),
}

/// Sending side kept inside the owner's shared state
pub(crate) struct WorkerHandle<U, E> {
    tx: mpsc::UnboundedSender<Command<U, E>>,
    name: &'static str,
}

impl<U, E> WorkerHandle<U, E> {
    pub fn dispatch(&self, unit: U) {
        if self.tx.send(Command::Dispatch(unit)).is_err() {
            tracing::warn!("⚠️ {} worker gone, dropping dispatch", self.name);
        }
    }

    pub fn deliver(&self, event: E) {
        if self.tx.send(Command::Deliver(event)).is_err() {
            tracing::warn!("⚠️ {} worker gone, dropping completion", self.name);
        }
    }
}

/// Spawn a worker on `runtime` running `handler` for every command
///
/// The worker exits once every [`WorkerHandle`] is dropped and the channel
/// is drained. A panicking handler is logged and the loop keeps going, so a
/// misbehaving transport or owner can never stall the queue.
pub(crate) fn spawn_worker<U, E, F>(
    runtime: &Handle,
    name: &'static str,
    mut handler: F,
) -> WorkerHandle<U, E>
where
    U: Send + 'static,
    E: Send + 'static,
    F: FnMut(Command<U, E>) + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Command<U, E>>();

    runtime.spawn(async move {
        tracing::debug!("🚀 {} worker started", name);
        while let Some(command) = rx.recv().await {
            if catch_unwind(AssertUnwindSafe(|| handler(command))).is_err() {
                tracing::error!("❌ {} worker handler panicked; continuing", name);
            }
        }
        tracing::debug!("{} worker stopped", name);
    });

    WorkerHandle { tx, name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_commands_processed_in_send_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let sink = Arc::clone(&seen);

        let worker = spawn_worker(&Handle::current(), "test", move |cmd: Command<u32, u32>| {
            let entry = match cmd {
                Command::Dispatch(n) => format!("dispatch {}", n),
                Command::Deliver(n) => format!("deliver {}", n),
            };
            sink.lock().unwrap().push(entry);
            let _ = done_tx.send(());
        });

        worker.deliver(1);
        worker.dispatch(2);
        worker.deliver(3);

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), done_rx.recv())
                .await
                .expect("worker should process command");
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["deliver 1", "dispatch 2", "deliver 3"]
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_worker() {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let worker = spawn_worker(&Handle::current(), "test", move |cmd: Command<u32, u32>| {
            if let Command::Dispatch(0) = cmd {
                panic!("boom");
            }
            let _ = done_tx.send(());
        });

        worker.dispatch(0);
        worker.deliver(1);

        tokio::time::timeout(Duration::from_secs(1), done_rx.recv())
            .await
            .expect("worker should survive a panic")
            .expect("channel open");
    }
}
