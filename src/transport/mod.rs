//! The opaque, pipe-addressable message bus nodes are wired to. The spec
//! treats the transport as an external collaborator exposing `send`/`recv`;
//! this module is the thin in-process stand-in used until a real message
//! bus (nng, a broker client, ...) is substituted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::GatewayResult;
use crate::value::TagValue;

/// Opaque handle addressing a single node's inbox, assigned at adapter
/// creation time. Cheap to copy and compare; carries no meaning beyond
/// "which pipe".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeHandle(u64);

static NEXT_PIPE: AtomicU64 = AtomicU64::new(1);

impl PipeHandle {
    pub fn next() -> Self {
        Self(NEXT_PIPE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Body of the control message the core emits on `subscribe`.
#[derive(Debug, Clone)]
pub struct SubscribeGroupBody {
    pub app: String,
    pub driver: String,
    pub group: String,
    pub params: Option<String>,
}

/// Body of a report-by-exception data push, emitted by a driver worker on
/// its report tick (see `Manager::report_group`). Not part of the core's
/// formally specified message set, but the same kind of thing the original
/// driver's report-tick path hands to every subscriber's pipe.
#[derive(Debug, Clone)]
pub struct DataReportBody {
    pub driver: String,
    pub group: String,
    pub values: Vec<(String, TagValue)>,
}

#[derive(Debug, Clone)]
pub enum MessageBody {
    SubscribeGroup(SubscribeGroupBody),
    DataReport(DataReportBody),
}

/// `{type, sender[N], receiver[N]}` header followed by a type-specific body,
/// per the wire form in the spec's external interfaces section.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: String,
    pub receiver: String,
    pub body: MessageBody,
}

/// `send(pipe, msg)` / `recv() -> (pipe, msg)` surface the core depends on.
/// A `send` failure is never fatal to the caller — see `Manager::send_subscribe`.
pub trait Transport: Send + Sync {
    fn send(&self, pipe: PipeHandle, msg: Message) -> GatewayResult<()>;

    /// Registers a fresh inbox for a newly created adapter and returns its
    /// handle. Adapters not currently polled by anything (e.g. in tests)
    /// are free to ignore the returned receiver.
    fn register_pipe(&self) -> PipeHandle;

    fn unregister_pipe(&self, pipe: PipeHandle);
}

/// In-memory transport: one bounded `tokio::mpsc` channel per pipe. Good
/// enough to exercise `send_subscribe` end to end in tests and in the
/// reference binary; a production deployment swaps this for a real bus
/// client behind the same trait.
#[derive(Default)]
pub struct InMemoryTransport {
    inboxes: Mutex<HashMap<PipeHandle, mpsc::UnboundedSender<(PipeHandle, Message)>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipe and returns the receiving half directly, so a
    /// driver/app worker can be spawned against it without a second lookup.
    pub fn register_pipe_with_receiver(
        &self,
    ) -> (PipeHandle, mpsc::UnboundedReceiver<(PipeHandle, Message)>) {
        let pipe = PipeHandle::next();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().insert(pipe, tx);
        (pipe, rx)
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, pipe: PipeHandle, msg: Message) -> GatewayResult<()> {
        let inboxes = self.inboxes.lock();
        match inboxes.get(&pipe) {
            Some(tx) => {
                if tx.send((pipe, msg)).is_err() {
                    warn!(pipe = pipe.raw(), "pipe inbox closed, dropping message");
                }
                Ok(())
            }
            None => {
                warn!(pipe = pipe.raw(), "send to unknown pipe");
                Ok(())
            }
        }
    }

    fn register_pipe(&self) -> PipeHandle {
        let (pipe, _rx) = self.register_pipe_with_receiver();
        pipe
    }

    fn unregister_pipe(&self, pipe: PipeHandle) {
        self.inboxes.lock().remove(&pipe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_to_registered_pipe_delivers() {
        let transport = InMemoryTransport::new();
        let (pipe, mut rx) = transport.register_pipe_with_receiver();
        transport
            .send(
                pipe,
                Message {
                    sender: "manager".into(),
                    receiver: "app1".into(),
                    body: MessageBody::SubscribeGroup(SubscribeGroupBody {
                        app: "app1".into(),
                        driver: "drv1".into(),
                        group: "g1".into(),
                        params: None,
                    }),
                },
            )
            .unwrap();
        let (received_pipe, msg) = rx.try_recv().unwrap();
        assert_eq!(received_pipe, pipe);
        match msg.body {
            MessageBody::SubscribeGroup(body) => assert_eq!(body.driver, "drv1"),
            MessageBody::DataReport(_) => panic!("unexpected data report"),
        }
    }

    #[test]
    fn send_to_unknown_pipe_is_non_fatal() {
        let transport = InMemoryTransport::new();
        let result = transport.send(
            PipeHandle::next(),
            Message {
                sender: "manager".into(),
                receiver: "ghost".into(),
                body: MessageBody::SubscribeGroup(SubscribeGroupBody {
                    app: "ghost".into(),
                    driver: "d".into(),
                    group: "g".into(),
                    params: None,
                }),
            },
        );
        assert!(result.is_ok());
    }
}
