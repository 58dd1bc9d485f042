//! Seeded lattice value noise.
//!
//! Lattice values come from integer mixing of (seed, ix, iz); bilinear
//! interpolation between them uses a smoothstep weight. Two processes on
//! different machines produce identical values for identical inputs.

/// Largest `f64` strictly below 1.0.
const BELOW_ONE: f64 = 1.0 - f64::EPSILON / 2.0;

/// 2^-53, maps the top 53 bits of a hash onto [0, 1).
const UNIT_SCALE: f64 = 1.0 / (1u64 << 53) as f64;

/// Splitmix64 finalizer, a fast, well-distributed integer mixer.
pub fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Derive an independent seed for a named noise layer.
pub fn layer_seed(seed: u64, layer: u64) -> u64 {
    splitmix64(seed ^ splitmix64(layer))
}

/// Integer hash of a lattice point.
pub fn lattice_hash(seed: u64, ix: i64, iz: i64) -> u64 {
    let h = splitmix64(seed ^ (ix as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    splitmix64(h ^ (iz as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f))
}

/// Uniform lattice value in [0, 1).
pub fn lattice(seed: u64, ix: i64, iz: i64) -> f64 {
    (lattice_hash(seed, ix, iz) >> 11) as f64 * UNIT_SCALE
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Continuous noise in [0, 1), smooth across lattice cells.
pub fn noise_value(seed: u64, x: f64, z: f64) -> f64 {
    let x0 = x.floor();
    let z0 = z.floor();
    let (ix, iz) = (x0 as i64, z0 as i64);
    let sx = smoothstep(x - x0);
    let sz = smoothstep(z - z0);

    let top = lerp(lattice(seed, ix, iz), lattice(seed, ix + 1, iz), sx);
    let bottom = lerp(lattice(seed, ix, iz + 1), lattice(seed, ix + 1, iz + 1), sx);
    lerp(top, bottom, sz).clamp(0.0, BELOW_ONE)
}

/// One octave of a layered noise sum.
#[derive(Debug, Clone, Copy)]
pub struct Octave {
    /// Lattice cells per tile.
    pub frequency: f64,
    pub weight: f64,
    /// Layer salt, so octaves are uncorrelated.
    pub layer: u64,
}

/// Weighted, normalized sum of octaves. Stays in [0, 1).
pub fn layered(seed: u64, x: f64, z: f64, octaves: &[Octave]) -> f64 {
    let mut total = 0.0;
    let mut weights = 0.0;
    for octave in octaves {
        let s = layer_seed(seed, octave.layer);
        total += noise_value(s, x * octave.frequency, z * octave.frequency) * octave.weight;
        weights += octave.weight;
    }
    if weights <= 0.0 {
        return 0.0;
    }
    (total / weights).clamp(0.0, BELOW_ONE)
}
