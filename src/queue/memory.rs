use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::ledger::Session;

use super::{
    QueueClient, QueueError, QueueMessage, ReceiptHandle, ReceivedMessage, Result, Sweep, long_poll,
    validate_target,
};

#[derive(Default)]
struct TargetState {
    next_seq: u64,
    messages: BTreeMap<u64, Entry>,
}

struct Entry {
    body: String,
    invisible_until: Option<Instant>,
    receive_count: u32,
}

/// In-process queue with long polling and visibility timeouts.
pub struct MemoryQueue {
    visibility_timeout: Duration,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    targets: Mutex<HashMap<String, TargetState>>,
    notify: Notify,
}

impl Shared {
    fn push(&self, target: &str, body: String) -> u64 {
        let seq = {
            let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
            let state = targets.entry(target.to_string()).or_default();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.messages.insert(
                seq,
                Entry {
                    body,
                    invisible_until: None,
                    receive_count: 0,
                },
            );
            seq
        };
        self.notify.notify_waiters();
        debug!(queue_target = target, seq, "Message published");
        seq
    }
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Enqueue a body without encoding it. Useful for feeding malformed payloads.
    pub fn publish_raw(&self, target: &str, body: impl Into<String>) -> Result<u64> {
        validate_target(target)?;
        Ok(self.shared.push(target, body.into()))
    }

    fn targets(&self) -> MutexGuard<'_, HashMap<String, TargetState>> {
        self.shared
            .targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages not yet deleted, visible or in flight.
    pub fn len(&self, target: &str) -> usize {
        self.targets()
            .get(target)
            .map_or(0, |state| state.messages.len())
    }

    pub fn is_empty(&self, target: &str) -> bool {
        self.len(target) == 0
    }

    /// Decoded copies of the pending messages, oldest first, without leasing them.
    pub fn peek(&self, target: &str) -> Vec<QueueMessage> {
        self.targets()
            .get(target)
            .map(|state| {
                state
                    .messages
                    .values()
                    .filter_map(|entry| QueueMessage::decode(&entry.body).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sweep(&self, target: &str, max_messages: usize, now: Instant) -> Sweep {
        let mut targets = self.targets();
        let mut sweep = Sweep {
            messages: Vec::new(),
            next_visible: None,
        };
        let Some(state) = targets.get_mut(target) else {
            return sweep;
        };

        for (seq, entry) in state.messages.iter_mut() {
            if sweep.messages.len() >= max_messages {
                break;
            }
            match entry.invisible_until {
                Some(until) if until > now => {
                    sweep.next_visible = Some(sweep.next_visible.map_or(until, |at| at.min(until)));
                }
                _ => {
                    entry.receive_count += 1;
                    entry.invisible_until = Some(now + self.visibility_timeout);
                    sweep.messages.push(ReceivedMessage {
                        body: entry.body.clone(),
                        handle: ReceiptHandle::issue(*seq, entry.receive_count),
                        receive_count: entry.receive_count,
                    });
                }
            }
        }
        sweep
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn publish(&self, target: &str, message: &QueueMessage) -> Result<()> {
        self.publish_raw(target, message.encode()?)?;
        Ok(())
    }

    async fn publish_in(&self, session: &mut Session, target: &str, message: &QueueMessage) -> Result<()> {
        validate_target(target)?;
        let body = message.encode()?;
        let shared = Arc::clone(&self.shared);
        let target = target.to_string();
        session.on_commit(move || {
            shared.push(&target, body);
        });
        Ok(())
    }

    async fn receive_batch(
        &self,
        target: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        validate_target(target)?;
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        long_poll(&self.shared.notify, wait, |now| Ok(self.sweep(target, max_messages, now))).await
    }

    async fn delete(&self, target: &str, handle: &ReceiptHandle) -> Result<()> {
        let (seq, receive_count) = handle.parts()?;
        let mut targets = self.targets();
        let Some(state) = targets.get_mut(target) else {
            return Ok(());
        };
        match state.messages.get(&seq) {
            Some(entry) if entry.receive_count != receive_count => {
                return Err(QueueError::StaleHandle(handle.to_string()));
            }
            Some(_) => {
                state.messages.remove(&seq);
            }
            None => {}
        }
        debug!(queue_target = target, seq, "Message deleted");
        Ok(())
    }
}
