//! Leave-one-mosaic-out folds with a positional train/validation split.

/// One cross-validation split, as indices into the mosaic set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub test: usize,
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    /// Validation reuses the training mosaics (no room for a held-out part).
    pub val_from_train: bool,
}

/// Split `pool` by position: the first `floor(n * (1 - val_split))` entries
/// train, the rest validate.
///
/// With `val_split > 0` and at least two pool entries both parts are kept
/// non-empty. A single-entry pool or `val_split == 0` validates on the
/// training entries and reports it through the returned flag.
pub fn split_by_position(pool: &[usize], val_split: f64) -> (Vec<usize>, Vec<usize>, bool) {
    let n = pool.len();
    if val_split <= 0.0 || n < 2 {
        return (pool.to_vec(), pool.to_vec(), true);
    }
    let n_train = ((n as f64) * (1.0 - val_split.min(1.0))).floor() as usize;
    let n_train = n_train.clamp(1, n - 1);
    (pool[..n_train].to_vec(), pool[n_train..].to_vec(), false)
}

/// Fold `i` tests mosaic `i` and pools the others in input order.
pub fn leave_one_out(n: usize, val_split: f64) -> Vec<Fold> {
    (0..n)
        .map(|test| {
            let pool: Vec<usize> = (0..n).filter(|j| *j != test).collect();
            let (train, val, val_from_train) = split_by_position(&pool, val_split);
            Fold {
                index: test,
                test,
                train,
                val,
                val_from_train,
            }
        })
        .collect()
}
