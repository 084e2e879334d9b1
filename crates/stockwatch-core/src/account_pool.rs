//! AccountPool - one authenticated session per (group, credential).
//!
//! Election protocol:
//! 1. `try_claim(key)`
//!    - `Materialized(session)`: adopt it, no login.
//!    - `Claimed(guard)`: this caller is the single writer and performs the login.
//!    - `InProgressByOther`: `wait_for(key)` until the writer finishes.
//! 2. The writer calls `guard.materialize(session)` on success. Dropping the
//!    guard without materializing releases the key so another Task can win
//!    the next election.
//!
//! Entries are swapped whole under the lock: readers see either the marker or
//! a complete `Arc<Session>`, never a partial value.
//!
//! # 学習ポイント
//! - RAII: `WriterGuard` の Drop で claim を解放（ログイン失敗・panic でも漏れない）
//! - ticket 番号で「自分の claim か」を判定（グループ削除後の materialize を無視）
//! - `Notify` で待機者を起こし、`poll` はその保険

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::domain::{GroupId, Session};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub group_id: GroupId,
    pub credential: String,
}

impl AccountKey {
    pub fn new(group_id: GroupId, credential: impl Into<String>) -> Self {
        Self {
            group_id,
            credential: credential.into(),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    InProgress { ticket: u64 },
    Ready(Arc<Session>),
}

#[derive(Debug)]
pub enum Claim {
    Materialized(Arc<Session>),
    Claimed(WriterGuard),
    InProgressByOther,
}

#[derive(Debug)]
pub enum WaitOutcome {
    Ready(Arc<Session>),
    /// The writer gave up; the key is free for a new election.
    Vacant,
    Stopped,
}

#[derive(Default)]
struct PoolInner {
    entries: Mutex<HashMap<AccountKey, Entry>>,
    changed: Notify,
    next_ticket: AtomicU64,
}

impl PoolInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<AccountKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared-session registry. Cheap to clone; owned by the Supervisor and
/// handed to every Task it starts.
#[derive(Clone, Default)]
pub struct AccountPool {
    inner: Arc<PoolInner>,
}

impl AccountPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_claim(&self, key: &AccountKey) -> Claim {
        let mut entries = self.inner.entries();
        match entries.get(key) {
            Some(Entry::Ready(session)) => Claim::Materialized(Arc::clone(session)),
            Some(Entry::InProgress { .. }) => Claim::InProgressByOther,
            None => {
                let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
                entries.insert(key.clone(), Entry::InProgress { ticket });
                Claim::Claimed(WriterGuard {
                    pool: self.clone(),
                    key: key.clone(),
                    ticket,
                    finished: false,
                })
            }
        }
    }

    /// Materialized session for `key`, if any.
    pub fn get(&self, key: &AccountKey) -> Option<Arc<Session>> {
        match self.inner.entries().get(key) {
            Some(Entry::Ready(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// Drops whatever `key` holds (e.g. a session the retailer expired).
    pub fn release(&self, key: &AccountKey) {
        if self.inner.entries().remove(key).is_some() {
            self.inner.changed.notify_waiters();
        }
    }

    /// Waits until `key` is materialized, vacated, or `stop` fires.
    ///
    /// Woken on every pool change, with `poll` as a fallback bound.
    pub async fn wait_for(
        &self,
        key: &AccountKey,
        stop: &CancellationToken,
        poll: Duration,
    ) -> WaitOutcome {
        loop {
            if stop.is_cancelled() {
                return WaitOutcome::Stopped;
            }

            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.inner.entries().get(key) {
                Some(Entry::Ready(session)) => return WaitOutcome::Ready(Arc::clone(session)),
                None => return WaitOutcome::Vacant,
                Some(Entry::InProgress { .. }) => {}
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(poll) => {}
                _ = stop.cancelled() => return WaitOutcome::Stopped,
            }
        }
    }

    /// Forgets every entry of a group that is shutting down.
    pub fn remove_group(&self, group_id: GroupId) -> usize {
        let removed = {
            let mut entries = self.inner.entries();
            let before = entries.len();
            entries.retain(|key, _| key.group_id != group_id);
            before - entries.len()
        };
        if removed > 0 {
            self.inner.changed.notify_waiters();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, key: &AccountKey, ticket: u64, session: Option<Arc<Session>>) {
        {
            let mut entries = self.inner.entries();
            let ours = matches!(
                entries.get(key),
                Some(Entry::InProgress { ticket: t }) if *t == ticket
            );
            if !ours {
                // group removed or key released meanwhile
                return;
            }
            match session {
                Some(session) => {
                    entries.insert(key.clone(), Entry::Ready(session));
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        self.inner.changed.notify_waiters();
    }
}

impl std::fmt::Debug for AccountPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountPool").field("entries", &self.len()).finish()
    }
}

/// Exclusive right to log in for one key.
#[derive(Debug)]
pub struct WriterGuard {
    pool: AccountPool,
    key: AccountKey,
    ticket: u64,
    finished: bool,
}

impl WriterGuard {
    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    /// Publishes the session to every Task sharing the key.
    pub fn materialize(mut self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.finished = true;
        self.pool
            .finish(&self.key, self.ticket, Some(Arc::clone(&session)));
        session
    }

    /// Gives up the claim so a later Task can retry the election.
    pub fn release(mut self) {
        self.finished = true;
        self.pool.finish(&self.key, self.ticket, None);
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.pool.finish(&self.key, self.ticket, None);
        }
    }
}
