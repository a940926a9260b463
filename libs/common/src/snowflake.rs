use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::id::MessageId;

/// Custom epoch: 2026-01-01T00:00:00Z in milliseconds since Unix epoch.
const PARLEY_EPOCH_MS: u64 = 1_767_225_600_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_MASK: u64 = (1 << WORKER_BITS) - 1;

struct State {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit snowflake generator for message ids.
///
/// Layout (MSB → LSB):
/// - Bits 63–22: Timestamp (42 bits), ms since the Parley epoch
/// - Bits 21–12: Worker ID (10 bits)
/// - Bits 11–0:  Sequence (12 bits), per-ms counter, max 4096/ms
///
/// If the wall clock steps backwards the generator keeps issuing ids on the
/// last observed millisecond, so ids stay strictly increasing.
pub struct SnowflakeGenerator {
    worker_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    /// Worker ids wider than 10 bits are masked.
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: u64::from(worker_id) & WORKER_MASK,
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next_id(&self) -> MessageId {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut now_ms = current_ms().max(state.last_ms);

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond; borrow the next one.
                now_ms = state.last_ms + 1;
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;

        let ts = now_ms.saturating_sub(PARLEY_EPOCH_MS);
        MessageId(
            (ts << (WORKER_BITS + SEQUENCE_BITS))
                | (self.worker_id << SEQUENCE_BITS)
                | state.sequence,
        )
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(PARLEY_EPOCH_MS)
}

/// Extract the creation timestamp (ms since Unix epoch) from a message id.
#[cfg(test)]
fn timestamp_ms(id: MessageId) -> u64 {
    (id.0 >> (WORKER_BITS + SEQUENCE_BITS)) + PARLEY_EPOCH_MS
}

/// Extract the worker id a message id was minted on.
#[cfg(test)]
fn worker_id(id: MessageId) -> u16 {
    ((id.0 >> SEQUENCE_BITS) & WORKER_MASK) as u16
}
