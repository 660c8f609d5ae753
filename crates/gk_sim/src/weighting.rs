use rand::Rng;

/// Cumulative-weight table for proportional index sampling.
#[derive(Debug, Clone, Default)]
pub struct WeightedTable {
    cumulative: Vec<f64>,
}

impl WeightedTable {
    /// Negative and non-finite weights count as zero.
    pub fn new<I: IntoIterator<Item = f64>>(weights: I) -> Self {
        let mut total = 0.0;
        let cumulative = weights
            .into_iter()
            .map(|w| {
                if w.is_finite() && w > 0.0 {
                    total += w;
                }
                total
            })
            .collect();
        Self { cumulative }
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Index drawn proportionally to its weight, or `None` when the table
    /// carries no mass.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let total = self.total();
        if self.cumulative.is_empty() || total <= 0.0 {
            return None;
        }
        let r: f64 = rng.gen_range(0.0..total);
        let idx = self
            .cumulative
            .partition_point(|&w| w <= r)
            .min(self.cumulative.len() - 1);
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn zero_weight_entries_are_never_drawn() {
        let table = WeightedTable::new([0.0, 2.0, 0.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut counts = [0usize; 4];
        for _ in 0..3_000 {
            let idx = table.sample(&mut rng).expect("non-empty");
            counts[idx] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        assert!(counts[1] > counts[3]);
    }

    #[test]
    fn empty_or_massless_table_yields_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(WeightedTable::new([]).sample(&mut rng).is_none());
        assert!(WeightedTable::new([0.0, -1.0]).sample(&mut rng).is_none());
    }
}
