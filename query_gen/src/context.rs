//! Generation context holding the RNG.
//!
//! Every generation and assembly function takes `&mut Context` instead of
//! reaching for a global random source, so a check can be replayed exactly
//! from the seed it was created with.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Context for query generation.
pub struct Context {
    rng: StdRng,
    seed: u64,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a new context with a random seed.
    pub fn new() -> Self {
        Self::new_with_seed(rand::rng().random())
    }

    /// Create a new context with a specific seed.
    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this context was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    // RNG methods

    /// Generate a random boolean.
    pub fn gen_bool(&mut self) -> bool {
        self.rng.random()
    }

    /// Generate a random boolean with the given probability of being true.
    pub fn gen_bool_with_prob(&mut self, prob: f64) -> bool {
        self.rng.random_bool(prob.clamp(0.0, 1.0))
    }

    /// Generate a random usize in the range [0, max).
    pub fn gen_range(&mut self, max: usize) -> usize {
        if max == 0 {
            0
        } else {
            self.rng.random_range(0..max)
        }
    }

    /// Generate a random usize in the range [min, max].
    pub fn gen_range_inclusive(&mut self, min: usize, max: usize) -> usize {
        if min >= max {
            min
        } else {
            self.rng.random_range(min..=max)
        }
    }

    /// Generate a random i64 in the given range.
    pub fn gen_i64_range(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            min
        } else {
            self.rng.random_range(min..=max)
        }
    }

    /// Generate a random f64 in the range [0, 1).
    pub fn gen_unit_f64(&mut self) -> f64 {
        self.rng.random()
    }

    /// Generate a random u64, used to derive child seeds.
    pub fn gen_u64(&mut self) -> u64 {
        self.rng.random()
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            let idx = self.gen_range(items.len());
            Some(&items[idx])
        }
    }

    /// Select a random non-empty subset of `items`, in random order.
    ///
    /// Returns an empty vector only when `items` is empty.
    pub fn nonempty_subset<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        if items.is_empty() {
            return Vec::new();
        }
        let mut shuffled = items.to_vec();
        shuffled.shuffle(&mut self.rng);
        let len = self.gen_range_inclusive(1, shuffled.len());
        shuffled.truncate(len);
        shuffled
    }

    /// Generate a random string of the given length.
    pub fn gen_string(&mut self, len: usize) -> String {
        const CHARSET: &[u8] =
            b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 %_'.-";
        (0..len)
            .map(|_| {
                let idx = self.gen_range(CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Context::new_with_seed(7);
        let mut b = Context::new_with_seed(7);
        for _ in 0..32 {
            assert_eq!(a.gen_u64(), b.gen_u64());
        }
        assert_eq!(a.seed(), 7);
    }

    #[test]
    fn test_gen_range_empty() {
        let mut ctx = Context::new_with_seed(1);
        assert_eq!(ctx.gen_range(0), 0);
        assert_eq!(ctx.gen_range_inclusive(3, 3), 3);
    }

    #[test]
    fn test_choose() {
        let mut ctx = Context::new_with_seed(42);
        let items = [1, 2, 3];
        assert!(items.contains(ctx.choose(&items).unwrap()));
        let empty: [i32; 0] = [];
        assert!(ctx.choose(&empty).is_none());
    }

    #[test]
    fn test_nonempty_subset() {
        let mut ctx = Context::new_with_seed(3);
        let items = ["a", "b", "c", "d"];
        for _ in 0..100 {
            let subset = ctx.nonempty_subset(&items);
            assert!(!subset.is_empty());
            assert!(subset.len() <= items.len());
            assert!(subset.iter().all(|s| items.contains(s)));
        }
        assert!(ctx.nonempty_subset::<i32>(&[]).is_empty());
    }
}
