/// Small seedable generator so level generation and ghost behaviour can be
/// replayed exactly from a seed.
#[derive(Clone, Debug)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        self.state = self.state.wrapping_add(0x6d2b79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        unit_from_bits(t ^ (t >> 14))
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        if probability <= 0.0 {
            return false;
        }
        self.next_f32() < probability
    }

    /// Uniform in `[0, max)`.
    pub fn jitter(&mut self, max: f32) -> f32 {
        (self.next_f32() * max).min(max * 0.999_999)
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        ((self.next_f32() * len as f32) as usize).min(len - 1)
    }
}

/// Keeps the top 24 bits, which an `f32` represents exactly, so the result
/// never rounds up to 1.0.
fn unit_from_bits(bits: u32) -> f32 {
    (bits >> 8) as f32 / 16_777_216.0
}
