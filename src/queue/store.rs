use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::ledger::{Ledger, Session};

use super::{
    QueueClient, QueueError, QueueMessage, ReceiptHandle, ReceivedMessage, Result, Sweep, long_poll,
    validate_target,
};

const NEXT_SEQ_KEY: &[u8] = b"next_seq";

fn encode_message_prefix(target: &str) -> String {
    format!("msg:{}:", target)
}

fn encode_message_key(target: &str, seq: u64) -> Vec<u8> {
    format!("msg:{}:{:020}", target, seq).into_bytes()
}

fn decode_message_seq(key: &[u8]) -> Option<u64> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.rsplit(':').next()?.parse().ok()
}

struct Lease {
    invisible_until: Instant,
    receive_count: u32,
}

/// FjallQueue persists queue messages in the ledger's Fjall keyspace
///
/// Architecture:
/// - `queue_messages` partition: msg:{target}:{seq:020} → message body (JSON)
/// - `queue_metadata` partition: "next_seq" → u64 (big-endian counter)
///
/// Sharing the keyspace lets [`QueueClient::publish_in`] stage a message in
/// the same batch as the ledger rows that reference it. Messages stay on disk
/// until deleted by handle. Leases (visibility timeouts and receive counts)
/// live in memory only, so after a restart every undeleted message is
/// immediately visible again.
pub struct FjallQueue {
    keyspace: Keyspace,
    messages: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: AtomicU64,
    leases: Mutex<HashMap<Vec<u8>, Lease>>,
    notify: Arc<Notify>,
    visibility_timeout: Duration,
}

impl FjallQueue {
    /// Open the queue partitions inside `ledger`
    pub fn open(ledger: &Ledger, visibility_timeout: Duration) -> Result<Self> {
        let messages = ledger.partition("queue_messages")?;
        let metadata = ledger.partition("queue_metadata")?;

        let stored = metadata
            .get(NEXT_SEQ_KEY)?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        // Sessions commit in any order, so the stored counter may trail the
        // highest sequence on disk.
        let mut highest = None;
        for key in messages.keys() {
            if let Some(seq) = decode_message_seq(&key?) {
                highest = highest.max(Some(seq));
            }
        }
        let current_seq = highest.map_or(stored, |seq| stored.max(seq + 1));

        info!(current_seq, "FjallQueue opened");

        Ok(Self {
            keyspace: ledger.keyspace().clone(),
            messages,
            metadata,
            seq_counter: AtomicU64::new(current_seq),
            leases: Mutex::new(HashMap::new()),
            notify: Arc::new(Notify::new()),
            visibility_timeout,
        })
    }

    /// Persist a body on its own and return its sequence number
    ///
    /// The message and the advanced counter are written in one batch, so a
    /// crash never leaves a message behind a stale counter.
    pub fn enqueue(&self, target: &str, body: &str) -> Result<u64> {
        validate_target(target)?;
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        let mut batch = self.keyspace.batch();
        batch.insert(
            &self.messages,
            encode_message_key(target, seq),
            body.as_bytes().to_vec(),
        );
        batch.insert(&self.metadata, NEXT_SEQ_KEY.to_vec(), (seq + 1).to_be_bytes().to_vec());
        batch.commit()?;

        self.notify.notify_waiters();
        debug!(seq, queue_target = target, "Message enqueued");
        Ok(seq)
    }

    /// Messages on disk for `target`, leased or not.
    pub fn depth(&self, target: &str) -> Result<usize> {
        let mut depth = 0;
        for item in self.messages.prefix(encode_message_prefix(target)) {
            item?;
            depth += 1;
        }
        Ok(depth)
    }

    /// Get current sequence counter value
    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn sweep(&self, target: &str, max_messages: usize, now: Instant) -> Result<Sweep> {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sweep = Sweep {
            messages: Vec::new(),
            next_visible: None,
        };

        for item in self.messages.prefix(encode_message_prefix(target)) {
            if sweep.messages.len() >= max_messages {
                break;
            }
            let (key, value) = item?;
            let Some(seq) = decode_message_seq(&key) else {
                continue;
            };

            let receive_count = match leases.get(&*key) {
                Some(lease) if lease.invisible_until > now => {
                    let until = lease.invisible_until;
                    sweep.next_visible = Some(sweep.next_visible.map_or(until, |at| at.min(until)));
                    continue;
                }
                Some(lease) => lease.receive_count + 1,
                None => 1,
            };

            leases.insert(
                key.to_vec(),
                Lease {
                    invisible_until: now + self.visibility_timeout,
                    receive_count,
                },
            );
            sweep.messages.push(ReceivedMessage {
                body: String::from_utf8_lossy(&value).into_owned(),
                handle: ReceiptHandle::issue(seq, receive_count),
                receive_count,
            });
        }
        Ok(sweep)
    }
}

#[async_trait]
impl QueueClient for FjallQueue {
    async fn publish(&self, target: &str, message: &QueueMessage) -> Result<()> {
        self.enqueue(target, &message.encode()?)?;
        Ok(())
    }

    /// Message and counter ride in the session's batch; waiters are woken
    /// once it commits.
    async fn publish_in(&self, session: &mut Session, target: &str, message: &QueueMessage) -> Result<()> {
        validate_target(target)?;
        let body = message.encode()?;
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        session.insert(&self.messages, encode_message_key(target, seq), body.into_bytes());
        session.insert(&self.metadata, NEXT_SEQ_KEY.to_vec(), (seq + 1).to_be_bytes().to_vec());

        let notify = Arc::clone(&self.notify);
        session.on_commit(move || notify.notify_waiters());
        debug!(seq, queue_target = target, "Message staged");
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
        long_poll(&self.notify, wait, |now| self.sweep(target, max_messages, now)).await
    }

    async fn delete(&self, target: &str, handle: &ReceiptHandle) -> Result<()> {
        let (seq, receive_count) = handle.parts()?;
        let key = encode_message_key(target, seq);
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);

        match leases.get(&key) {
            Some(lease) if lease.receive_count == receive_count => {}
            // Unleased messages can only be deleted once they are gone.
            _ if self.messages.contains_key(&key)? => {
                return Err(QueueError::StaleHandle(handle.to_string()));
            }
            _ => {}
        }

        self.messages.remove(key.clone())?;
        leases.remove(&key);
        debug!(queue_target = target, handle = %handle, "Message deleted");
        Ok(())
    }
}
