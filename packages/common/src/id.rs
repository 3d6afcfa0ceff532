use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// 2024-01-01T00:00:00Z in milliseconds since the Unix epoch.
pub const ID_EPOCH_MS: u64 = 1_704_067_200_000;

const MACHINE_BITS: u32 = 10;
const INSTANCE_BITS: u32 = 4;
const SEQUENCE_BITS: u32 = 8;

pub const MAX_MACHINE_ID: u16 = (1 << MACHINE_BITS) - 1;
/// Highest instance slot; processes sharing a machine tag each hold one.
pub const MAX_INSTANCE: u16 = (1 << INSTANCE_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("machine id {0} is out of range (max 1023)")]
    MachineIdOutOfRange(u16),

    #[error("instance {0} is out of range (max 15)")]
    InstanceOutOfRange(u16),
}

/// Time-based, machine-tagged id generator.
///
/// Layout (most significant first): 41 bits of milliseconds since
/// [`ID_EPOCH_MS`], 10 bits of machine id, 4 bits of instance, 8 bits of
/// sequence. Ids minted by one generator are strictly increasing. Two
/// generators never collide as long as their `(machine_id, instance)` pairs
/// differ; processes sharing a machine tag must each hold a distinct instance
/// slot (the server leases one from its database at startup).
///
/// There is no process-wide instance: construct one at startup and hand it to
/// whatever needs to mint ids.
#[derive(Debug)]
pub struct IdGenerator {
    /// `machine_id` and `instance` pre-shifted into place.
    tag: u64,
    /// `(elapsed_ms << SEQUENCE_BITS) | sequence` of the last id handed out.
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new(machine_id: u16, instance: u16) -> Result<Self, IdError> {
        if machine_id > MAX_MACHINE_ID {
            return Err(IdError::MachineIdOutOfRange(machine_id));
        }
        if instance > MAX_INSTANCE {
            return Err(IdError::InstanceOutOfRange(instance));
        }
        let tag = ((machine_id as u64) << (INSTANCE_BITS + SEQUENCE_BITS))
            | ((instance as u64) << SEQUENCE_BITS);
        Ok(Self {
            tag,
            last: AtomicU64::new(0),
        })
    }

    /// Mint the next id.
    pub fn next_id(&self) -> i64 {
        let now = elapsed_ms();
        let mut current = self.last.load(Ordering::Relaxed);

        loop {
            let last_ms = current >> SEQUENCE_BITS;
            let last_seq = current & MAX_SEQUENCE;

            // A sequence overflow or a clock step backwards borrows from the
            // next millisecond instead of reusing a slot.
            let next = if now > last_ms {
                now << SEQUENCE_BITS
            } else if last_seq < MAX_SEQUENCE {
                current + 1
            } else {
                (last_ms + 1) << SEQUENCE_BITS
            };

            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return self.compose(next),
                Err(actual) => current = actual,
            }
        }
    }

    fn compose(&self, state: u64) -> i64 {
        let ms = state >> SEQUENCE_BITS;
        let seq = state & MAX_SEQUENCE;
        ((ms << (MACHINE_BITS + INSTANCE_BITS + SEQUENCE_BITS)) | self.tag | seq) as i64
    }
}

fn elapsed_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    now.saturating_sub(ID_EPOCH_MS)
}
