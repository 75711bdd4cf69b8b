use std::time::Duration;

/// Phase timer and cyclic timer of one session, plus headroom.
pub const MAX_SCHEDULER_TASKS: usize = 4;

/// Largest frame read from an adapter: 1500 payload, Ethernet header and one
/// 802.1Q tag.
pub const MAX_FRAME_SIZE: usize = 1522;

pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(20);
pub const DEFAULT_RESPONSE_DELAY_FACTOR: u16 = 0x0080;

pub const DEFAULT_PHASE_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(10);
/// Cycle counter ticks are 31.25 us, so 32 ticks per millisecond.
pub const DEFAULT_CYCLE_COUNTER_STEP: u16 = 32;
