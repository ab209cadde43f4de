//! Weighted random selection.

use rand::Rng;

/// Pick an index proportionally to `weights`. Non-positive weights never win.
pub fn weighted_index<R: Rng>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let mut roll = rng.gen::<f64>() * total;
    let mut last = None;
    for (i, &weight) in weights.iter().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        last = Some(i);
        roll -= weight;
        if roll < 0.0 {
            return Some(i);
        }
    }
    // Rounding can leave a sliver of roll; it belongs to the last positive weight.
    last
}

/// Draw up to `budget` distinct items, each draw weighted among the remaining ones.
pub fn sample_without_replacement<T, R: Rng>(mut items: Vec<(T, f64)>, budget: usize, rng: &mut R) -> Vec<T> {
    items.retain(|(_, w)| *w > 0.0);
    let mut chosen = Vec::with_capacity(budget.min(items.len()));
    while chosen.len() < budget && !items.is_empty() {
        let weights: Vec<f64> = items.iter().map(|(_, w)| *w).collect();
        match weighted_index(&weights, rng) {
            Some(i) => chosen.push(items.remove(i).0),
            None => break,
        }
    }
    chosen
}

/// Bernoulli trial; probabilities outside [0, 1] are clamped.
pub fn chance<R: Rng>(probability: f64, rng: &mut R) -> bool {
    let p = probability.clamp(0.0, 1.0);
    if p <= 0.0 {
        false
    } else if p >= 1.0 {
        true
    } else {
        rng.gen::<f64>() < p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_zero_weights_never_selected() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let i = weighted_index(&[0.0, 3.0, -1.0, 1.0], &mut rng).unwrap();
            assert!(i == 1 || i == 3);
        }
        assert_eq!(weighted_index(&[0.0, -2.0], &mut rng), None);
        assert_eq!(weighted_index(&[], &mut rng), None);
    }

    #[test]
    fn test_sample_respects_budget_and_distinctness() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let items = vec![("a", 1.0), ("b", 2.0), ("c", 0.0), ("d", 5.0)];
        let picked = sample_without_replacement(items.clone(), 2, &mut rng);
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
        assert!(!picked.contains(&"c"));

        let all = sample_without_replacement(items, 10, &mut rng);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_chance_edges_consume_no_randomness() {
        let mut a = ChaCha8Rng::seed_from_u64(9);
        let mut b = ChaCha8Rng::seed_from_u64(9);
        assert!(chance(1.5, &mut a));
        assert!(!chance(0.0, &mut a));
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }
}
