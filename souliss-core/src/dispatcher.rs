//! Send dispatcher: coalescing outbound queue, send pacing and secure-send reconciliation.
//!
//! FORCE frames stay queued after transmission until every command byte is confirmed by the
//! state the nodes later report, or until they time out. Confirmation is purely a matter of
//! observed state; the nodes never acknowledge a FORCE explicitly.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::protocol::{macaco_to_string, PAYLOAD_OFFSET};
use crate::sync::lock;
use crate::wire;

/// Tick delay while at most one frame is queued.
pub const MIN_DELAY: Duration = Duration::ZERO;

/// Outcome of checking one command byte against the typical it addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// No typical is registered at (node, slot).
    Absent,
    /// The typical does not acknowledge this command, or already reports the expected state.
    Confirmed,
    /// The typical has not reached the expected state yet.
    Pending,
}

/// Read access to typical state for the reconciliation sweep.
pub trait TypicalStates {
    fn confirmation(&self, node: u8, slot: u8, command: u8) -> Confirmation;
}

/// Queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    destination: SocketAddr,
    bytes: Vec<u8>,
    sent: bool,
    sent_at: Option<Instant>,
    first_sent_at: Option<Instant>,
}

impl OutboundFrame {
    fn new(destination: SocketAddr, bytes: Vec<u8>) -> Self {
        Self {
            destination,
            bytes,
            sent: false,
            sent_at: None,
            first_sent_at: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    fn force_node(&self) -> Option<u8> {
        wire::force_node(&self.bytes)
    }

    fn commands(&self) -> &[u8] {
        self.bytes.get(PAYLOAD_OFFSET..).unwrap_or_default()
    }

    fn is_satisfied(&self) -> bool {
        self.commands().iter().all(|b| *b == 0)
    }
}

/// Datagram the host must put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub destination: SocketAddr,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherTimings {
    pub refresh_interval: Duration,
    pub requeue_timeout: Duration,
    pub remove_timeout: Duration,
}

#[derive(Debug, Default)]
struct Pacer {
    last_run: Option<Instant>,
    last_send: Option<Instant>,
}

/// Outbound queue shared by every producer of frames and the single ticking task.
#[derive(Debug)]
pub struct SendDispatcher {
    queue: Mutex<Vec<OutboundFrame>>,
    pacer: Mutex<Pacer>,
    timings: DispatcherTimings,
}

impl SendDispatcher {
    pub fn new(timings: DispatcherTimings) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            pacer: Mutex::new(Pacer::default()),
            timings,
        }
    }

    pub fn timings(&self) -> DispatcherTimings {
        self.timings
    }

    /// Queue a frame. A FORCE frame is merged into the unsent frame already queued for the same
    /// node, if any.
    pub fn enqueue(&self, destination: SocketAddr, bytes: Vec<u8>) {
        let mut queue = lock(&self.queue);
        let Some(node) = wire::force_node(&bytes) else {
            queue.push(OutboundFrame::new(destination, bytes));
            return;
        };
        let existing = queue.iter().position(|f| {
            !f.sent && f.destination == destination && f.force_node() == Some(node)
        });
        match existing {
            None => {
                trace!(node, "queue {}", macaco_to_string(&bytes));
                queue.push(OutboundFrame::new(destination, bytes));
            }
            Some(i) if bytes.len() <= queue[i].bytes.len() => {
                let target = &mut queue[i];
                target.bytes = merge_commands(&target.bytes, &bytes);
                debug!(node, "optimizer: merged into pending frame");
                trace!(node, "merged {}", macaco_to_string(&target.bytes));
            }
            Some(i) => {
                let old = queue.remove(i);
                let bytes = merge_commands(&old.bytes, &bytes);
                debug!(node, "optimizer: longer frame replaces pending frame");
                trace!(node, "replaced {}", macaco_to_string(&bytes));
                queue.push(OutboundFrame::new(destination, bytes));
            }
        }
    }

    /// Advance the send loop: pop at most one frame, then reconcile sent frames against the
    /// state reported by the typicals. Skips the round if an enqueue holds the queue.
    pub fn tick(&self, now: Instant, states: &impl TypicalStates) -> Option<Transmission> {
        let mut queue = match self.queue.try_lock() {
            Ok(q) => q,
            Err(TryLockError::Poisoned(e)) => PoisonError::into_inner(e),
            Err(TryLockError::WouldBlock) => {
                trace!("enqueue in progress; tick skipped");
                return None;
            }
        };
        let mut pacer = lock(&self.pacer);

        let delay = if queue.len() > 1 {
            self.timings.refresh_interval
        } else {
            MIN_DELAY
        };
        if pacer
            .last_run
            .is_some_and(|last| now.saturating_duration_since(last) < delay)
        {
            return None;
        }
        pacer.last_run = Some(now);

        let may_send = pacer
            .last_send
            .map_or(true, |last| {
                now.saturating_duration_since(last) >= self.timings.refresh_interval
            });
        let mut out = None;
        if may_send {
            out = pop(&mut queue, now);
            if out.is_some() {
                pacer.last_send = Some(now);
            }
        }
        drop(pacer);

        self.sweep(&mut queue, now, states);
        out
    }

    fn sweep(&self, queue: &mut Vec<OutboundFrame>, now: Instant, states: &impl TypicalStates) {
        let timings = self.timings;
        queue.retain_mut(|frame| {
            if !frame.sent {
                return true;
            }
            let node = frame.force_node().unwrap_or_default();
            for j in PAYLOAD_OFFSET..frame.bytes.len() {
                let command = frame.bytes[j];
                if command == 0 {
                    continue;
                }
                let slot = (j - PAYLOAD_OFFSET) as u8;
                match states.confirmation(node, slot, command) {
                    Confirmation::Confirmed => frame.bytes[j] = 0,
                    Confirmation::Absent if j > PAYLOAD_OFFSET && frame.bytes[j - 1] == 0 => {
                        frame.bytes[j] = 0
                    }
                    Confirmation::Absent | Confirmation::Pending => {}
                }
            }

            if frame.is_satisfied() {
                debug!(node, "secure send: frame confirmed, removed");
                return false;
            }
            let since_first = frame
                .first_sent_at
                .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
            if since_first > timings.remove_timeout {
                info!(
                    node,
                    "secure send: no confirmation after {:?}, frame dropped {}",
                    timings.remove_timeout,
                    macaco_to_string(&frame.bytes)
                );
                return false;
            }
            let since_last = frame
                .sent_at
                .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
            if since_last > timings.requeue_timeout {
                info!(node, "secure send: no confirmation, frame requeued");
                frame.sent = false;
            }
            true
        });
        fold_requeued(queue);
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the queue in insertion order.
    pub fn snapshot(&self) -> Vec<OutboundFrame> {
        lock(&self.queue).clone()
    }

    /// Drop every queued frame without sending it.
    pub fn clear(&self) {
        lock(&self.queue).clear();
    }
}

/// Overlay `newer` on `older`. Nonzero bytes of the newer frame win; zeros never clear a byte.
fn merge_commands(older: &[u8], newer: &[u8]) -> Vec<u8> {
    let mut out = if newer.len() >= older.len() {
        newer.to_vec()
    } else {
        older.to_vec()
    };
    for (j, byte) in out.iter_mut().enumerate().skip(PAYLOAD_OFFSET) {
        let n = newer.get(j).copied().unwrap_or(0);
        *byte = if n != 0 {
            n
        } else {
            older.get(j).copied().unwrap_or(0)
        };
    }
    out
}

/// Whether `a` carries later commands than `b`. A frame never sent is the newest.
fn is_newer(a: &OutboundFrame, b: &OutboundFrame) -> bool {
    match (a.first_sent_at, b.first_sent_at) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(x), Some(y)) => x >= y,
    }
}

/// A requeued frame becomes unsent again; fold it into any other unsent frame for the same
/// node so at most one unsent FORCE frame per node remains.
fn fold_requeued(queue: &mut Vec<OutboundFrame>) {
    let mut i = 0;
    while i < queue.len() {
        let frame = &queue[i];
        let requeued = !frame.sent && frame.first_sent_at.is_some();
        let twin = match frame.force_node() {
            Some(node) if requeued => (0..queue.len()).find(|&k| {
                let other = &queue[k];
                k != i
                    && !other.sent
                    && other.destination == frame.destination
                    && other.force_node() == Some(node)
            }),
            _ => None,
        };
        let Some(k) = twin else {
            i += 1;
            continue;
        };
        let (keep, drop) = if is_newer(&queue[k], &queue[i]) {
            (k, i)
        } else {
            (i, k)
        };
        let merged = merge_commands(&queue[drop].bytes, &queue[keep].bytes);
        debug!(
            node = queue[i].force_node().unwrap_or_default(),
            "secure send: requeued frame folded into pending frame"
        );
        queue[keep].bytes = merged;
        queue.remove(drop);
        if drop < i {
            i -= 1;
        }
    }
}

fn pop(queue: &mut Vec<OutboundFrame>, now: Instant) -> Option<Transmission> {
    let i = queue.iter().position(|f| !f.sent)?;
    debug!("pop frame {} of {}", i + 1, queue.len());
    let frame = &mut queue[i];
    let out = Transmission {
        destination: frame.destination,
        bytes: frame.bytes.clone(),
    };
    trace!(destination = %out.destination, "send {}", macaco_to_string(&out.bytes));

    if frame.force_node().is_some() {
        frame.sent = true;
        frame.sent_at = Some(now);
        frame.first_sent_at.get_or_insert(now);
    } else {
        queue.remove(i);
    }
    Some(out)
}
