use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TypeError;
use crate::node::NodeId;

const SEQUENCE_BITS: u32 = 32;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Monotonic source of node and version ids.
///
/// An id is `client_id << 32 | sequence`. Each client owns a disjoint id
/// space, so ids generated by different clients never collide, and ids from
/// one generator strictly increase. Sequence numbers start above
/// [`NodeId::ROOT`].
///
/// A generator knows nothing about ids handed out by earlier generators with
/// the same client id. Feed it every id it may have to stay clear of through
/// [`observe`](Self::observe).
#[derive(Debug)]
pub struct IdGenerator {
    client_id: u32,
    sequence: AtomicU64,
}

impl IdGenerator {
    /// Create a generator for a fixed client id.
    pub fn new(client_id: u32) -> Self {
        Self {
            client_id,
            sequence: AtomicU64::new(NodeId::ROOT.raw()),
        }
    }

    /// Create a generator with a random client id.
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Make sure every later id is greater than `id`. Ids from other clients
    /// are ignored.
    pub fn observe(&self, id: u64) {
        if id >> SEQUENCE_BITS == u64::from(self.client_id) {
            self.sequence.fetch_max(id & SEQUENCE_MASK, Ordering::Relaxed);
        }
    }

    /// Next raw id.
    pub fn generate(&self) -> Result<u64, TypeError> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        if seq > SEQUENCE_MASK {
            self.sequence.store(SEQUENCE_MASK + 1, Ordering::Relaxed);
            return Err(TypeError::IdSpaceExhausted {
                client_id: self.client_id,
            });
        }
        Ok((u64::from(self.client_id) << SEQUENCE_BITS) | seq)
    }

    /// Next id, typed as a node id.
    pub fn generate_node_id(&self) -> Result<NodeId, TypeError> {
        self.generate().map(NodeId::new)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::random()
    }
}
