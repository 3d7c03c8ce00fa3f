use super::types::Position;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Derive a per-trial seed from the run seed and the trial's identity, so
/// a replay of the same run assigns identical positions while distinct
/// trials stay statistically independent.
pub fn mix_seed(run_seed: u64, skill_id: &str, prompt_index: usize) -> u64 {
    let mut mixed = run_seed ^ fnv1a64(skill_id.as_bytes());
    mixed = mixed.rotate_left(17) ^ fnv1a64(&prompt_index.to_le_bytes());
    mixed
}

/// Draw the blinded presentation order for one trial.
pub fn position_for_trial(run_seed: u64, skill_id: &str, prompt_index: usize) -> Position {
    let mut rng = StdRng::seed_from_u64(mix_seed(run_seed, skill_id, prompt_index));
    Position::from_coin(rng.random_bool(0.5))
}

/// Production default: a fresh seed per run.
pub fn fresh_run_seed() -> u64 {
    rand::rng().random()
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xCBF2_9CE4_8422_2325_u64;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
    hash
}
