use std::sync::LazyLock;

use crate::MAX_HEIGHT;

/// Chance that a tower reaching level `i` also reaches level `i + 1`.
const PROBABILITY: f64 = 0.5;

static INSTANCE: LazyLock<RandomHeight> = LazyLock::new(RandomHeight::new);

/// Process-wide source of tower heights.
///
/// Both tables are computed once and only read afterwards; the random draw
/// comes from the calling thread's own generator, so no lock is involved.
pub(crate) struct RandomHeight {
    // lookup[i]: probability that a drawn height is at most i + 1
    lookup: [f64; MAX_HEIGHT],
    // size_limit[h]: element count above which a list of height h should grow
    size_limit: [usize; MAX_HEIGHT],
}

impl RandomHeight {
    fn new() -> Self {
        let mut lookup = [0.0; MAX_HEIGHT];
        let mut size_limit = [0; MAX_HEIGHT];

        let mut p = 1.0 - PROBABILITY;
        let mut limit = 1.0;
        lookup[0] = p;
        size_limit[0] = 1;
        for i in 1..MAX_HEIGHT - 1 {
            p *= PROBABILITY;
            limit /= PROBABILITY;
            lookup[i] = lookup[i - 1] + p;
            size_limit[i] = if limit >= usize::MAX as f64 {
                usize::MAX
            } else {
                limit as usize
            };
        }
        lookup[MAX_HEIGHT - 1] = 1.0;
        size_limit[MAX_HEIGHT - 1] = usize::MAX;

        Self { lookup, size_limit }
    }

    pub(crate) fn instance() -> &'static Self {
        &INSTANCE
    }

    /// Draws a height in `[1, min(max_height, MAX_HEIGHT)]`, each level half as
    /// likely as the one below.
    pub(crate) fn get_height(&self, max_height: usize) -> usize {
        debug_assert!(max_height > 0, "max_height must be positive");
        let max_height = max_height.clamp(1, MAX_HEIGHT);
        let p: f64 = rand::random();
        self.height_for(p, max_height)
    }

    fn height_for(&self, p: f64, max_height: usize) -> usize {
        self.lookup[..max_height]
            .iter()
            .position(|&bound| p < bound)
            .map_or(max_height, |i| i + 1)
    }

    pub(crate) fn get_size_limit(&self, height: usize) -> usize {
        assert!(height < MAX_HEIGHT, "height {height} out of range");
        self.size_limit[height]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_bounds() {
        let oracle = RandomHeight::instance();
        for max in 1..=MAX_HEIGHT {
            for _ in 0..200 {
                let h = oracle.get_height(max);
                assert!((1..=max).contains(&h), "height {h}, max {max}");
            }
        }
        assert_eq!(oracle.get_height(1), 1);
        assert!(oracle.get_height(MAX_HEIGHT * 2) <= MAX_HEIGHT);
    }

    #[test]
    fn test_height_for() {
        let oracle = RandomHeight::instance();
        assert_eq!(oracle.height_for(0.0, MAX_HEIGHT), 1);
        assert_eq!(oracle.height_for(0.49, MAX_HEIGHT), 1);
        assert_eq!(oracle.height_for(0.5, MAX_HEIGHT), 2);
        assert_eq!(oracle.height_for(0.74, MAX_HEIGHT), 2);
        assert_eq!(oracle.height_for(0.76, MAX_HEIGHT), 3);
        assert_eq!(oracle.height_for(0.99, 3), 3);
    }

    #[test]
    fn test_geometric_distribution() {
        const DRAWS: usize = 100_000;

        let oracle = RandomHeight::instance();
        let mut counts = [0usize; MAX_HEIGHT + 1];
        for _ in 0..DRAWS {
            counts[oracle.get_height(MAX_HEIGHT)] += 1;
        }

        // roughly half of all towers have height 1, a quarter height 2
        let ones = counts[1] as f64 / DRAWS as f64;
        let twos = counts[2] as f64 / DRAWS as f64;
        assert!((0.45..0.55).contains(&ones), "height 1 ratio {ones}");
        assert!((0.2..0.3).contains(&twos), "height 2 ratio {twos}");
    }

    #[test]
    fn test_size_limit() {
        let oracle = RandomHeight::instance();
        assert_eq!(oracle.get_size_limit(0), 1);
        assert_eq!(oracle.get_size_limit(1), 2);
        assert_eq!(oracle.get_size_limit(2), 4);
        assert_eq!(oracle.get_size_limit(10), 1024);
        assert_eq!(oracle.get_size_limit(MAX_HEIGHT - 1), usize::MAX);
        for h in 1..MAX_HEIGHT {
            assert!(oracle.get_size_limit(h) >= oracle.get_size_limit(h - 1));
        }
    }
}
