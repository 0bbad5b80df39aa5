use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Random,
    Sequential,
}

/// Picks one index out of `[0, count)` per call.
///
/// The sequential cursor only ever moves forward and is taken modulo the
/// count at selection time, so it is not reset when the catalog shrinks or
/// grows. After a size change the next pick may land anywhere in the new
/// range.
#[derive(Debug, Clone)]
pub struct Selector {
    mode: SelectionMode,
    cursor: usize,
    rng: StdRng,
}

impl Selector {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            cursor: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic random picks, for reproducible runs and tests.
    pub fn with_seed(mode: SelectionMode, seed: u64) -> Self {
        Self {
            mode,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
    }

    pub fn select(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        match self.mode {
            SelectionMode::Random => Some(self.rng.random_range(0..count)),
            SelectionMode::Sequential => {
                let index = self.cursor % count;
                self.cursor = self.cursor.wrapping_add(1);
                Some(index)
            }
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(SelectionMode::default())
    }
}
