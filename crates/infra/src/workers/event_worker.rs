use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use tallybook_core::CompanyId;
use tallybook_events::{CompanyScoped, EventBus, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic bus consumer loop.
///
/// - Subscribes before the thread starts, so nothing published afterwards is missed
/// - Handler failures are logged and the loop keeps going
/// - Optional company filtering
#[derive(Debug)]
pub struct EventWorker;

impl EventWorker {
    /// Spawn a named thread draining a fresh subscription of `bus`.
    ///
    /// `handler` must tolerate redelivery of the same message.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        company_id: Option<CompanyId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: CompanyScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, company_id, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    company_id: Option<CompanyId>,
    handler: &mut H,
) where
    M: CompanyScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if company_id.is_some_and(|c| msg.company_id() != c) {
                    continue;
                }

                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "event worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
