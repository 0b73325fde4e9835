/// Xorshift32 stream used for obstacle gaps. Every world owns its own stream so
/// runs seeded alike draw identical gap sequences.
#[derive(Clone, Copy, Debug)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    /// A zero seed would pin xorshift at zero, so it is remapped. Cell and
    /// generation seeds from [`derive_seed`] already avoid it.
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0xDEAD_BEEF } else { seed },
        }
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    pub fn next(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        self.state
    }

    pub fn next_int(&mut self, max: u32) -> u32 {
        self.next() % max
    }

    /// Draws a gap top in `[min, max_exclusive)`. One draw per spawned or
    /// recycled obstacle, in spawn order.
    pub fn next_range(&mut self, min: i32, max_exclusive: i32) -> i32 {
        debug_assert!(max_exclusive > min);
        let span = (max_exclusive - min) as u32;
        min + self.next_int(span) as i32
    }
}

/// Mixes a parent seed with a stream index into a child seed (splitmix-style
/// finalizer folded to 32 bits). Used to derive per-cell and per-generation
/// seeds without any shared counter.
pub fn derive_seed(parent: u32, stream: u64) -> u32 {
    let mut z = (parent as u64) ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    let folded = (z ^ (z >> 32)) as u32;
    if folded == 0 {
        0xDEAD_BEEF
    } else {
        folded
    }
}
