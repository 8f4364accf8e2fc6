//! Ledger service: a tokio task that owns the [`Ledger`] and applies commands
//! one at a time in channel order.
//!
//! Callers talk to it through a cloneable [`LedgerHandle`]. Events from every
//! successful command are fanned out on a broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use fhescore_core::{ActorId, BatchId, CiphertextHandle, LedgerEvent, RequestId};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ledger::{AdminOp, Ledger};
use crate::LedgerError;

/// Pending commands before senders wait.
const COMMAND_QUEUE: usize = 256;
const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("ledger service stopped")]
    Stopped,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Source of "now" for every command.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Unix seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Settable clock for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

type Reply<T> = oneshot::Sender<Result<T, LedgerError>>;
type ReadFn = Box<dyn FnOnce(&Ledger) + Send>;

enum Command {
    Admin {
        caller: ActorId,
        op: AdminOp,
        reply: Reply<Vec<LedgerEvent>>,
    },
    Submit {
        caller: ActorId,
        batch_id: BatchId,
        score: CiphertextHandle,
        reply: Reply<Vec<LedgerEvent>>,
    },
    RequestDecryption {
        caller: ActorId,
        batch_id: BatchId,
        reply: Reply<(RequestId, Vec<LedgerEvent>)>,
    },
    DecryptionResult {
        caller: ActorId,
        request_id: RequestId,
        cleartext: Vec<u8>,
        proof: Vec<u8>,
        reply: Reply<Vec<LedgerEvent>>,
    },
    Read(ReadFn),
}

/// Owns the ledger inside its task.
pub struct LedgerService {
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<LedgerEvent>,
}

/// Async client for a running [`LedgerService`].
#[derive(Clone)]
pub struct LedgerHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<LedgerEvent>,
}

impl LedgerService {
    pub fn new(ledger: Ledger, clock: Arc<dyn Clock>) -> (Self, LedgerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let service = Self {
            ledger,
            clock,
            commands: rx,
            events: events.clone(),
        };
        let handle = LedgerHandle {
            commands: tx,
            events,
        };
        (service, handle)
    }

    /// Spawn onto the current runtime.
    pub fn spawn(ledger: Ledger, clock: Arc<dyn Clock>) -> (LedgerHandle, JoinHandle<Ledger>) {
        let (service, handle) = Self::new(ledger, clock);
        (handle, tokio::spawn(service.run()))
    }

    /// Apply commands until every handle is dropped; returns the final ledger.
    pub async fn run(mut self) -> Ledger {
        info!("ledger service started");
        while let Some(command) = self.commands.recv().await {
            self.apply(command);
        }
        info!("ledger service stopped");
        self.ledger
    }

    fn apply(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::Admin { caller, op, reply } => {
                let result = self.ledger.admin(&caller, op, now);
                self.finish(result, |events| events, reply);
            }
            Command::Submit {
                caller,
                batch_id,
                score,
                reply,
            } => {
                let result = self.ledger.submit(&caller, batch_id, score, now);
                self.finish(result, |events| events, reply);
            }
            Command::RequestDecryption {
                caller,
                batch_id,
                reply,
            } => {
                let result = self.ledger.request_decryption(&caller, batch_id, now);
                self.finish(result, |(_, events)| events, reply);
            }
            Command::DecryptionResult {
                caller,
                request_id,
                cleartext,
                proof,
                reply,
            } => {
                let result =
                    self.ledger
                        .on_decryption_result(&caller, request_id, &cleartext, &proof, now);
                self.finish(result, |events| events, reply);
            }
            Command::Read(f) => f(&self.ledger),
        }
    }

    fn finish<T>(
        &self,
        result: Result<T, LedgerError>,
        events_of: impl Fn(&T) -> &Vec<LedgerEvent>,
        reply: Reply<T>,
    ) {
        if let Ok(value) = &result {
            for event in events_of(value) {
                // No subscribers is fine.
                let _ = self.events.send(event.clone());
            }
        }
        if reply.send(result).is_err() {
            debug!("caller went away before the reply");
        }
    }
}

impl LedgerHandle {
    /// Every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| ServiceError::Stopped)?;
        Ok(rx.await.map_err(|_| ServiceError::Stopped)??)
    }

    pub async fn admin(&self, caller: ActorId, op: AdminOp) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.call(|reply| Command::Admin { caller, op, reply }).await
    }

    pub async fn submit(
        &self,
        caller: ActorId,
        batch_id: BatchId,
        score: CiphertextHandle,
    ) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.call(|reply| Command::Submit {
            caller,
            batch_id,
            score,
            reply,
        })
        .await
    }

    pub async fn request_decryption(
        &self,
        caller: ActorId,
        batch_id: BatchId,
    ) -> Result<RequestId, ServiceError> {
        let (request_id, _) = self
            .call(|reply| Command::RequestDecryption {
                caller,
                batch_id,
                reply,
            })
            .await?;
        Ok(request_id)
    }

    pub async fn deliver_decryption(
        &self,
        caller: ActorId,
        request_id: RequestId,
        cleartext: Vec<u8>,
        proof: Vec<u8>,
    ) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.call(|reply| Command::DecryptionResult {
            caller,
            request_id,
            cleartext,
            proof,
            reply,
        })
        .await
    }

    /// Run a read-only query against the ledger, ordered with the commands.
    pub async fn read<R, F>(&self, f: F) -> Result<R, ServiceError>
    where
        R: Send + 'static,
        F: FnOnce(&Ledger) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let read: ReadFn = Box::new(move |ledger| {
            let _ = tx.send(f(ledger));
        });
        self.commands
            .send(Command::Read(read))
            .await
            .map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now(), 10);
        clock.advance(5);
        assert_eq!(clock.now(), 15);
        clock.set(3);
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
