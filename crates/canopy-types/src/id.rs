//! Node id generation.
//!
//! Ids double as keys in the CRDT `types` map, so they are restricted to an
//! alphabet that never collides with reserved keys (`$$typeId`) or path
//! separators.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::value::NodeId;

pub const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
pub const ID_LENGTH: usize = 21;

/// Source of fresh node ids.
///
/// `Thread` draws from the thread-local RNG; `Seeded` uses xoshiro256** so a
/// document built twice from the same seed assigns the same ids.
#[derive(Debug, Clone, Default)]
pub enum IdGenerator {
    #[default]
    Thread,
    Seeded(Xoshiro256StarStar),
}

impl IdGenerator {
    pub fn seeded(seed: u64) -> Self {
        Self::Seeded(Xoshiro256StarStar::seed_from_u64(seed))
    }

    pub fn next_id(&mut self) -> NodeId {
        match self {
            Self::Thread => draw(&mut rand::thread_rng()),
            Self::Seeded(rng) => draw(rng),
        }
    }
}

fn draw<R: Rng>(rng: &mut R) -> NodeId {
    let id: String = (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    NodeId::from(id)
}

/// Generate a random id from the thread-local RNG.
pub fn generate_id() -> NodeId {
    IdGenerator::Thread.next_id()
}

/// Ids supplied by callers only need to be usable as CRDT map keys.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.starts_with("$$") && !id.contains('/')
}

/// Arena identity of a [`crate::Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

impl DocumentId {
    pub(crate) fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}
