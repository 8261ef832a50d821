use std::collections::HashMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Names of the random streams the engine and its systems draw from.
pub mod streams {
    /// Initial population and reset reseeding
    pub const SEED: &str = "seed";
    /// Exit vectors of collected tools
    pub const EXIT: &str = "exit";
    pub const AGING: &str = "aging";
    pub const REAPER: &str = "reaper";
    /// Tools spawned to restore the active floor
    pub const REPLENISH: &str = "replenish";
}

/// Seeded source of independent random streams, one per named consumer.
///
/// Every stream shares the session key and runs on its own ChaCha stream
/// number, hashed from its name. A consumer therefore sees the same values
/// for a given seed no matter which other streams exist or when they were
/// first drawn from.
pub struct RngManager {
    seed: u64,
    streams: HashMap<&'static str, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            streams: HashMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stream(&mut self, name: &'static str) -> SystemRng<'_> {
        let seed = self.seed;
        let inner = self.streams.entry(name).or_insert_with(|| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(stream_number(name));
            rng
        });
        SystemRng { inner }
    }
}

/// FNV-1a over the stream name.
fn stream_number(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

pub struct SystemRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl<'a> RngCore for SystemRng<'a> {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
