//! Per-peer outbound queues and the writer task that drains them.
//!
//! Every accepted connection gets one [`PeerHandle`] (cloned into the
//! registry and the connection handler) and one writer task owning the
//! socket's write half. Enqueueing never blocks, so a slow peer can only
//! ever hurt itself:
//!
//! - `GuaranteedOrdered` frames go through a bounded FIFO. When it is full
//!   the peer is considered stalled and closed.
//! - `BestEffortLatest` frames are coalesced per subject player; only the
//!   newest pending frame per subject survives.
//! - `BestEffortUnordered` frames go through a second bounded queue and are
//!   dropped when it is full.
//!
//! The writer remembers which players it has written a PlayerSpawn for and
//! drops movement about anyone else, so a client never sees a player move
//! before it has been spawned.

use bytes::Bytes;
use log::{debug, warn};
use shared::{Message, PlayerId};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch, Notify};

/// Delivery guarantee requested for an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    GuaranteedOrdered,
    BestEffortLatest,
    BestEffortUnordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("peer {0} is closed")]
    Closed(SocketAddr),

    #[error("outbound queue for {0} overflowed")]
    Overflow(SocketAddr),
}

/// Which player an outbound frame is about, as far as the writer cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    None,
    Spawn(PlayerId),
    Despawn(PlayerId),
    Movement(PlayerId),
}

impl Subject {
    pub fn of(message: &Message) -> Subject {
        match message {
            Message::PlayerSpawn { player_id, .. } => Subject::Spawn(*player_id),
            Message::PlayerDisconnect { player_id } => Subject::Despawn(*player_id),
            Message::PlayerMovement { player_id, .. } => Subject::Movement(*player_id),
            _ => Subject::None,
        }
    }
}

struct Outbound {
    frame: Bytes,
    subject: Subject,
    /// Fired once everything queued before (and including) this entry has
    /// been written.
    ack: Option<oneshot::Sender<()>>,
}

struct PeerShared {
    addr: SocketAddr,
    latest: Mutex<BTreeMap<PlayerId, Bytes>>,
    latest_ready: Notify,
    closed: watch::Sender<bool>,
}

impl PeerShared {
    fn latest(&self) -> std::sync::MutexGuard<'_, BTreeMap<PlayerId, Bytes>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sending side of a peer's outbound queues
#[derive(Clone)]
pub struct PeerHandle {
    shared: Arc<PeerShared>,
    ordered: mpsc::Sender<Outbound>,
    unordered: mpsc::Sender<Bytes>,
}

/// Receiving side, consumed by [`run_writer`]
pub struct PeerQueues {
    shared: Arc<PeerShared>,
    ordered: mpsc::Receiver<Outbound>,
    unordered: mpsc::Receiver<Bytes>,
}

/// Creates the queues for a new peer. `capacity` bounds both the ordered and
/// the unordered queue.
pub fn channel(addr: SocketAddr, capacity: usize) -> (PeerHandle, PeerQueues) {
    let (ordered_tx, ordered_rx) = mpsc::channel(capacity);
    let (unordered_tx, unordered_rx) = mpsc::channel(capacity);
    let (closed, _) = watch::channel(false);

    let shared = Arc::new(PeerShared {
        addr,
        latest: Mutex::new(BTreeMap::new()),
        latest_ready: Notify::new(),
        closed,
    });

    let handle = PeerHandle {
        shared: Arc::clone(&shared),
        ordered: ordered_tx,
        unordered: unordered_tx,
    };
    let queues = PeerQueues {
        shared,
        ordered: ordered_rx,
        unordered: unordered_rx,
    };
    (handle, queues)
}

impl PeerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.shared.addr
    }

    /// Enqueues an already encoded frame without waiting
    ///
    /// Latest-class frames need a movement subject to coalesce on; anything
    /// else sent with that class is treated as unordered.
    pub fn send_frame(
        &self,
        frame: Bytes,
        subject: Subject,
        class: Reliability,
    ) -> Result<(), PeerError> {
        if self.is_closed() {
            return Err(PeerError::Closed(self.addr()));
        }

        match (class, subject) {
            (Reliability::GuaranteedOrdered, _) => {
                let outbound = Outbound {
                    frame,
                    subject,
                    ack: None,
                };
                match self.ordered.try_send(outbound) {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("Outbound queue for {} is full, closing peer", self.addr());
                        self.close();
                        Err(PeerError::Overflow(self.addr()))
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        Err(PeerError::Closed(self.addr()))
                    }
                }
            }
            (Reliability::BestEffortLatest, Subject::Movement(player_id)) => {
                self.shared.latest().insert(player_id, frame);
                self.shared.latest_ready.notify_one();
                Ok(())
            }
            _ => match self.unordered.try_send(frame) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Dropping best-effort frame for {}", self.addr());
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(PeerError::Closed(self.addr())),
            },
        }
    }

    pub fn send(&self, message: &Message, class: Reliability) -> Result<(), PeerError> {
        self.send_frame(message.encode(), Subject::of(message), class)
    }

    /// Waits until every guaranteed-ordered frame queued so far has been
    /// written to the socket.
    pub async fn barrier(&self) -> Result<(), PeerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let marker = Outbound {
            frame: Bytes::new(),
            subject: Subject::None,
            ack: Some(ack_tx),
        };

        let closed = PeerError::Closed(self.addr());
        tokio::select! {
            sent = self.ordered.send(marker) => sent.map_err(|_| closed)?,
            _ = self.closed() => return Err(closed),
        }
        tokio::select! {
            acked = ack_rx => acked.map_err(|_| closed),
            _ = self.closed() => Err(closed),
        }
    }

    /// Marks the peer closed. The writer stops and discards whatever is
    /// still queued.
    pub fn close(&self) {
        self.shared.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Resolves once the peer has been closed, by either side.
    pub async fn closed(&self) {
        let mut closed = self.shared.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("addr", &self.shared.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drains a peer's queues into `writer` until the peer is closed or the
/// write fails. The peer is always marked closed on return.
pub async fn run_writer<W>(mut queues: PeerQueues, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    let shared = Arc::clone(&queues.shared);
    let mut closed = shared.closed.subscribe();

    let result = tokio::select! {
        result = queues.drain_into(&mut writer) => result,
        _ = closed.wait_for(|closed| *closed) => Ok(()),
    };

    if let Err(e) = result {
        debug!("Write to {} failed: {}", shared.addr, e);
    }
    shared.closed.send_replace(true);
    let _ = writer.shutdown().await;
    debug!("Writer for {} stopped", shared.addr);
}

impl PeerQueues {
    async fn drain_into<W>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        // Players this peer has been told about
        let mut known: HashSet<PlayerId> = HashSet::new();

        loop {
            tokio::select! {
                biased;

                outbound = self.ordered.recv() => {
                    let Some(outbound) = outbound else { return Ok(()) };
                    self.write_ordered(outbound, writer, &mut known).await?;
                }
                _ = self.shared.latest_ready.notified() => {
                    let pending = std::mem::take(&mut *self.shared.latest());
                    for (subject, frame) in pending {
                        if known.contains(&subject) {
                            writer.write_all(&frame).await?;
                        }
                    }
                    writer.flush().await?;
                }
                frame = self.unordered.recv() => {
                    let Some(frame) = frame else { return Ok(()) };
                    writer.write_all(&frame).await?;
                    writer.flush().await?;
                }
            }
        }
    }

    async fn write_ordered<W>(
        &self,
        outbound: Outbound,
        writer: &mut W,
        known: &mut HashSet<PlayerId>,
    ) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if !outbound.frame.is_empty() {
            writer.write_all(&outbound.frame).await?;
            writer.flush().await?;
        }

        match outbound.subject {
            Subject::Spawn(player_id) => {
                known.insert(player_id);
            }
            Subject::Despawn(player_id) => {
                known.remove(&player_id);
                self.shared.latest().remove(&player_id);
            }
            Subject::None | Subject::Movement(_) => {}
        }

        if let Some(ack) = outbound.ack {
            let _ = ack.send(());
        }
        Ok(())
    }
}
