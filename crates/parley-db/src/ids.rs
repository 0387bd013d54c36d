use std::sync::{Mutex, PoisonError};

use anyhow::{Result, bail};
use chrono::Utc;

/// Source of globally unique, roughly time-ordered identifiers.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> u64;
}

/// 2024-01-01T00:00:00Z in milliseconds.
const EPOCH_MS: i64 = 1_704_067_200_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

pub const MAX_NODE_ID: u16 = (1 << NODE_BITS) - 1;

/// Snowflake-style generator: 41 bits of milliseconds since `EPOCH_MS`,
/// 10 bits of node id and a 12 bit per-millisecond sequence. The top bit is
/// always clear so ids fit SQLite's signed INTEGER.
///
/// When the sequence runs out, or the wall clock steps backwards, the
/// generator advances its own logical millisecond instead of waiting, so
/// `next_id` never blocks.
pub struct IdGenerator {
    node_id: u64,
    state: Mutex<State>,
}

struct State {
    last_ms: i64,
    sequence: u64,
}

impl IdGenerator {
    pub fn new(node_id: u16) -> Result<Self> {
        if node_id > MAX_NODE_ID {
            bail!("node id {} exceeds maximum {}", node_id, MAX_NODE_ID);
        }
        if now_ms() < EPOCH_MS {
            bail!("system clock is set before the id epoch");
        }

        Ok(Self {
            node_id: u64::from(node_id),
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }
}

impl IdSource for IdGenerator {
    fn next_id(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut ms = now_ms().max(state.last_ms);
        if ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                ms += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = ms;

        let elapsed = (ms - EPOCH_MS) as u64;
        (elapsed << (NODE_BITS + SEQUENCE_BITS)) | (self.node_id << SEQUENCE_BITS) | state.sequence
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
