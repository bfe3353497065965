use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// IDs store milliseconds relative to 2025-01-01T00:00:00Z.
const EPOCH_MS: u64 = 1_735_689_600_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_SHIFT: u32 = WORKER_BITS + SEQUENCE_BITS;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Generator for time-ordered 64-bit row IDs (threads, replies, stars,
/// alerts).
///
/// An ID packs, high bits first: 42 bits of milliseconds since the epoch,
/// a 10-bit worker ID, and a 12-bit per-millisecond sequence. IDs from one
/// generator are strictly increasing; generators with distinct worker IDs
/// never collide.
pub struct SnowflakeGenerator {
    worker_id: u64,
    clock: Mutex<Clock>,
}

struct Clock {
    millis: u64,
    sequence: u64,
}

impl SnowflakeGenerator {
    /// Panics if `worker_id` does not fit in 10 bits.
    pub fn new(worker_id: u16) -> Self {
        assert!((u64::from(worker_id) >> WORKER_BITS) == 0, "worker_id out of range");
        Self {
            worker_id: u64::from(worker_id),
            clock: Mutex::new(Clock {
                millis: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut clock = self.clock.lock().expect("generator mutex poisoned");

        let now = loop {
            let now = unix_millis();
            assert!(now >= clock.millis, "system clock moved backwards");
            if now > clock.millis {
                clock.sequence = 0;
                break now;
            }
            if clock.sequence < MAX_SEQUENCE {
                clock.sequence += 1;
                break now;
            }
            // 4096 IDs issued this millisecond; wait out the remainder.
            std::hint::spin_loop();
        };
        clock.millis = now;

        let id = ((now - EPOCH_MS) << TIMESTAMP_SHIFT)
            | (self.worker_id << SEQUENCE_BITS)
            | clock.sequence;
        id as i64
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before Unix epoch")
        .as_millis() as u64
}

/// Creation time of a snowflake ID, in milliseconds since the Unix epoch.
pub fn timestamp_ms(id: i64) -> u64 {
    ((id as u64) >> TIMESTAMP_SHIFT) + EPOCH_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ten_thousand_ids_without_a_duplicate() {
        let gen = SnowflakeGenerator::new(0);
        let ids: HashSet<i64> = (0..10_000).map(|_| gen.generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn ids_increase_strictly() {
        let gen = SnowflakeGenerator::new(0);
        let mut prev = 0i64;
        for _ in 0..1_000 {
            let id = gen.generate();
            assert!(id > prev, "{id} did not exceed {prev}");
            prev = id;
        }
    }

    #[test]
    fn embedded_timestamp_matches_the_wall_clock() {
        let gen = SnowflakeGenerator::new(0);
        let before = unix_millis();
        let at = timestamp_ms(gen.generate());
        let after = unix_millis();
        assert!(at >= before && at <= after, "{at} outside [{before}, {after}]");
    }

    #[test]
    fn distinct_workers_never_collide() {
        let a = SnowflakeGenerator::new(1);
        let b = SnowflakeGenerator::new(2);
        let ids_a: HashSet<i64> = (0..1_000).map(|_| a.generate()).collect();
        let ids_b: HashSet<i64> = (0..1_000).map(|_| b.generate()).collect();
        assert!(ids_a.is_disjoint(&ids_b));
    }
}
