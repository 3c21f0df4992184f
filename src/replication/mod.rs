pub mod handshake;

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use strum_macros::Display;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Upstream;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Commands buffered per replica. A replica that falls this far behind is dropped.
pub const REPLICA_QUEUE_CAPACITY: usize = 1024;

/// Role names as reported by `INFO replication`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Role {
    #[strum(serialize = "master")]
    Primary,
    #[strum(serialize = "slave")]
    Replica,
}

/// Replication state shared by every connection.
///
/// On a primary it owns the registry of replica links and forwards every write command to them.
/// On a replica it tracks the id and offset of the stream received from the primary.
#[derive(Clone)]
pub struct Replication {
    inner: Arc<Inner>,
}

struct Inner {
    role: Role,
    upstream: Option<Upstream>,
    id: RwLock<String>,
    offset: AtomicU64,
    // Also serializes write commands on a primary so that the order in which they are applied
    // to the store is the order in which replicas receive them.
    links: Mutex<Vec<ReplicaLink>>,
}

struct ReplicaLink {
    id: Uuid,
    sender: Sender<Bytes>,
}

/// What a primary answers to `PSYNC`, plus the stream of commands to forward afterwards.
pub struct FullResync {
    pub id: String,
    pub offset: u64,
    pub snapshot: Bytes,
    pub link: Receiver<Bytes>,
}

impl Replication {
    pub fn primary() -> Self {
        Self::new(Role::Primary, None, generate_id())
    }

    /// The id is unknown until the primary announces it in its `+FULLRESYNC` reply.
    pub fn replica(upstream: Upstream) -> Self {
        Self::new(Role::Replica, Some(upstream), "?".to_string())
    }

    fn new(role: Role, upstream: Option<Upstream>, id: String) -> Self {
        let inner = Inner {
            role,
            upstream,
            id: RwLock::new(id),
            offset: AtomicU64::new(0),
            links: Mutex::new(Vec::new()),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn upstream(&self) -> Option<&Upstream> {
        self.inner.upstream.as_ref()
    }

    pub fn id(&self) -> String {
        self.inner
            .id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn offset(&self) -> u64 {
        self.inner.offset.load(Ordering::SeqCst)
    }

    /// Adopts the stream position announced by a primary.
    pub fn follow(&self, id: String, offset: u64) {
        *self.inner.id.write().unwrap_or_else(PoisonError::into_inner) = id;
        self.inner.offset.store(offset, Ordering::SeqCst);
    }

    /// Accounts for `bytes` of replication stream processed by a replica.
    pub fn advance(&self, bytes: u64) {
        self.inner.offset.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn replica_count(&self) -> usize {
        self.links().len()
    }

    /// Runs `apply` and, when acting as a primary and it succeeds, forwards `command` to every
    /// replica link. Links whose connection is gone, or whose queue is full, are dropped from
    /// the registry.
    pub fn write<T>(
        &self,
        command: &Frame,
        apply: impl FnOnce() -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.role() != Role::Primary {
            return apply();
        }

        let mut links = self.links();
        let res = apply()?;

        let bytes = Bytes::from(command.serialize());
        self.advance(bytes.len() as u64);

        links.retain(|link| match link.sender.try_send(bytes.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(replica = %link.id, "dropping lagging replica link");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(replica = %link.id, "dropping disconnected replica link");
                false
            }
        });

        Ok(res)
    }

    /// Snapshots `store` and registers a new replica link in one step, so that the replica
    /// receives every write applied after the snapshot and none applied before it.
    pub fn attach(&self, store: &Store) -> Result<FullResync, Error> {
        if self.role() != Role::Primary {
            return Err("replica cannot serve PSYNC".into());
        }

        let mut links = self.links();

        let snapshot = store.lock().snapshot().encode()?;
        let (sender, link) = mpsc::channel(REPLICA_QUEUE_CAPACITY);
        let id = Uuid::new_v4();
        links.push(ReplicaLink { id, sender });

        info!(replica = %id, replicas = links.len(), "replica attached");

        Ok(FullResync {
            id: self.id(),
            offset: self.offset(),
            snapshot,
            link,
        })
    }

    fn links(&self) -> MutexGuard<'_, Vec<ReplicaLink>> {
        self.inner
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A 40 character hexadecimal replication id.
fn generate_id() -> String {
    let mut id = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    id.truncate(40);
    id
}
