use crate::core::Block;
use log::info;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Easiest allowed target in compact form; the bootstrap phase pins the
/// chain to this value.
pub const MAX_BITS: u32 = 0x207f_ffff;

/// A single retarget may not move the target by more than this factor in
/// either direction.
const RETARGET_CLAMP_FACTOR: i64 = 4;

/// Decode the compact (exponent + mantissa) encoding into the full target.
pub fn compact_to_target(bits: u32) -> BigUint {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;
    if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    }
}

/// Encode a target back into compact form, normalizing the mantissa so its
/// high bit (the compact sign bit) is clear.
pub fn target_to_compact(target: &BigUint) -> u32 {
    let bytes = target.to_bytes_be();
    if target == &BigUint::from(0u32) {
        return 0;
    }

    let mut size = bytes.len();
    let mut compact: u32 = if size <= 3 {
        let mut value: u32 = 0;
        for byte in &bytes {
            value = (value << 8) | u32::from(*byte);
        }
        value << (8 * (3 - size))
    } else {
        let mut value: u32 = 0;
        for byte in &bytes[..3] {
            value = (value << 8) | u32::from(*byte);
        }
        value
    };

    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    ((size as u32) << 24) | (compact & 0x007f_ffff)
}

pub fn max_target() -> BigUint {
    compact_to_target(MAX_BITS)
}

/// Difficulty and reward schedule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub initial_reward: f64,
    pub halving_interval: u64,
    pub adjustment_interval: u64,
    pub target_block_time_ms: i64,
    pub bootstrap_blocks: u64,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            initial_reward: 50.0,
            halving_interval: 100_000,
            adjustment_interval: 10,
            target_block_time_ms: 30_000,
            bootstrap_blocks: 10,
        }
    }
}

impl Schedule {
    /// Block reward as a pure function of chain length: the initial reward
    /// halved once per completed halving interval. Never a function of
    /// wall-clock time.
    pub fn reward(&self, chain_length: u64) -> f64 {
        let halvings = chain_length / self.halving_interval;
        self.initial_reward / 2f64.powi(halvings as i32)
    }

    /// Height at which the next halving takes effect.
    pub fn next_halving(&self, chain_length: u64) -> u64 {
        (chain_length / self.halving_interval + 1) * self.halving_interval
    }

    /// Compute the compact target for the next block given the current
    /// chain. Bootstrap blocks are pinned to the easiest target; afterwards
    /// the target is rescaled every adjustment interval by the ratio of
    /// actual to expected elapsed time, clamped to a bounded factor, with a
    /// fixed bump applied at halving boundaries.
    pub fn retarget(&self, chain: &[Block], current_bits: u32) -> u32 {
        let height = chain.len() as u64;
        if height <= self.bootstrap_blocks {
            return MAX_BITS;
        }

        let mut bits = current_bits;

        if height % self.adjustment_interval == 0 {
            let window_len = self.adjustment_interval as usize;
            let window = &chain[chain.len() - window_len..];
            let first_ts = window[0].get_timestamp();
            let last_ts = window[window_len - 1].get_timestamp();
            let actual = (last_ts - first_ts).max(1);
            let expected = self.target_block_time_ms * self.adjustment_interval as i64;
            let clamped = actual.clamp(
                expected / RETARGET_CLAMP_FACTOR,
                expected * RETARGET_CLAMP_FACTOR,
            );

            let target = compact_to_target(bits);
            let mut new_target = target * BigUint::from(clamped as u64) / BigUint::from(expected as u64);
            if new_target > max_target() {
                new_target = max_target();
            }
            if new_target == BigUint::from(0u32) {
                new_target = BigUint::from(1u32);
            }
            let new_bits = target_to_compact(&new_target);
            info!(
                "Retarget at height {height}: bits {bits:#010x} -> {new_bits:#010x} (actual {actual}ms, expected {expected}ms)"
            );
            bits = new_bits;
        }

        if height % self.halving_interval == 0 {
            // Small fixed bump at each halving boundary: shrink the target
            // by 1/16
            let target = compact_to_target(bits);
            let mut bumped = &target - (&target >> 4u32);
            if bumped == BigUint::from(0u32) {
                bumped = BigUint::from(1u32);
            }
            bits = target_to_compact(&bumped);
            info!("Halving boundary at height {height}: difficulty bumped to bits {bits:#010x}");
        }

        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Block;

    fn build_chain(count: usize, block_gap_ms: i64) -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        for i in 1..count {
            let prev = chain.last().unwrap().clone();
            let timestamp = crate::core::block::GENESIS_TIMESTAMP + i as i64 * block_gap_ms;
            chain.push(Block::new_test_block(&prev, vec![], MAX_BITS, timestamp));
        }
        chain
    }

    #[test]
    fn test_compact_round_trip() {
        for bits in [MAX_BITS, 0x1d00_ffff, 0x1b04_04cb, 0x1f00_8000] {
            let target = compact_to_target(bits);
            assert_eq!(target_to_compact(&target), bits, "bits {bits:#010x}");
        }
    }

    #[test]
    fn test_bootstrap_phase_pins_easiest_target() {
        let schedule = Schedule::default();
        let chain = build_chain(5, 30_000);
        assert_eq!(schedule.retarget(&chain, 0x1d00_ffff), MAX_BITS);
    }

    #[test]
    fn test_fast_blocks_raise_difficulty() {
        let schedule = Schedule {
            bootstrap_blocks: 5,
            adjustment_interval: 10,
            ..Default::default()
        };
        // 1s actual gaps vs a 30s target: the target must shrink
        let chain = build_chain(20, 1_000);
        let new_bits = schedule.retarget(&chain, MAX_BITS);
        assert!(compact_to_target(new_bits) < compact_to_target(MAX_BITS));
    }

    #[test]
    fn test_retarget_is_clamped() {
        let schedule = Schedule {
            bootstrap_blocks: 5,
            adjustment_interval: 10,
            ..Default::default()
        };
        // Absurdly fast blocks: the shrink must be bounded by the clamp
        let chain = build_chain(20, 1);
        let new_bits = schedule.retarget(&chain, MAX_BITS);
        let floor = compact_to_target(MAX_BITS) / BigUint::from(RETARGET_CLAMP_FACTOR as u32);
        // Compact rounding may trim low bits, but the order of magnitude
        // must respect the clamp
        assert!(compact_to_target(new_bits) >= &floor >> 8u32);
        assert!(compact_to_target(new_bits) <= floor << 1u32);
    }

    #[test]
    fn test_slow_blocks_never_exceed_max_target() {
        let schedule = Schedule {
            bootstrap_blocks: 5,
            adjustment_interval: 10,
            ..Default::default()
        };
        let chain = build_chain(20, 600_000);
        let new_bits = schedule.retarget(&chain, MAX_BITS);
        assert!(compact_to_target(new_bits) <= max_target());
    }

    #[test]
    fn test_off_interval_heights_keep_current_bits() {
        let schedule = Schedule {
            bootstrap_blocks: 5,
            adjustment_interval: 10,
            ..Default::default()
        };
        let chain = build_chain(17, 30_000);
        assert_eq!(schedule.retarget(&chain, 0x1f00_ffff), 0x1f00_ffff);
    }

    #[test]
    fn test_reward_halving_schedule() {
        let schedule = Schedule {
            initial_reward: 50.0,
            halving_interval: 3,
            ..Default::default()
        };
        assert_eq!(schedule.reward(0), 50.0);
        assert_eq!(schedule.reward(2), 50.0);
        assert_eq!(schedule.reward(3), 25.0);
        assert_eq!(schedule.reward(5), 25.0);
        assert_eq!(schedule.reward(6), 12.5);
        assert_eq!(schedule.next_halving(0), 3);
        assert_eq!(schedule.next_halving(3), 6);
    }

    #[test]
    fn test_halving_boundary_bumps_difficulty() {
        let schedule = Schedule {
            bootstrap_blocks: 2,
            adjustment_interval: 100,
            halving_interval: 4,
            ..Default::default()
        };
        let chain = build_chain(8, 30_000);
        let new_bits = schedule.retarget(&chain, MAX_BITS);
        assert!(compact_to_target(new_bits) < compact_to_target(MAX_BITS));
    }
}
