//! Walk-forward splitting: rolling train windows with non-overlapping test
//! windows.
//!
//! The splitter is a state machine over one cursor. Each step yields
//! `train = [start, start + train_window)` and the test window that
//! immediately follows it, then advances the cursor by `test_window`. The
//! train window rolls forward rather than expanding.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floor for auto-shrunk train windows.
pub const MIN_SHRUNK_TRAIN: usize = 250;
/// Floor for auto-shrunk test windows.
pub const MIN_SHRUNK_TEST: usize = 21;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalkForwardError {
    #[error("window sizes must be positive (train {train}, test {test})")]
    ZeroWindow { train: usize, test: usize },
    #[error("no fold fits in {rows} rows (train {train}, test {test})")]
    NoFolds {
        rows: usize,
        train: usize,
        test: usize,
    },
}

// ─── Fold ────────────────────────────────────────────────────────────

/// One train/test pair of half-open row ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

impl Fold {
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }
}

/// Iterator over the folds of a table with `n` rows.
#[derive(Debug, Clone)]
pub struct SplitIter {
    n: usize,
    train_window: usize,
    test_window: usize,
    min_train: Option<usize>,
    start: usize,
    yielded: usize,
}

impl Iterator for SplitIter {
    type Item = Fold;

    fn next(&mut self) -> Option<Fold> {
        // A zero test window would never advance the cursor.
        if self.test_window == 0 {
            return None;
        }
        loop {
            let train_end = self.start.checked_add(self.train_window)?;
            let test_end = train_end.checked_add(self.test_window)?;
            if test_end > self.n {
                return None;
            }
            let train = self.start..train_end;
            self.start += self.test_window;
            if self.min_train.is_some_and(|m| train.len() < m) {
                continue;
            }
            let fold = Fold {
                index: self.yielded,
                train,
                test: train_end..test_end,
            };
            self.yielded += 1;
            return Some(fold);
        }
    }
}

/// Lazily split `n` ordered rows into walk-forward folds.
pub fn walk_forward_splits(
    n: usize,
    train_window: usize,
    test_window: usize,
    min_train: Option<usize>,
) -> SplitIter {
    SplitIter {
        n,
        train_window,
        test_window,
        min_train,
        start: 0,
        yielded: 0,
    }
}

/// Shrink windows for a short history: when `rows < train + test` the
/// windows become `max(250, 0.6·rows)` and `max(21, 0.1·rows)`.
pub fn shrink_windows(rows: usize, train_window: usize, test_window: usize) -> (usize, usize) {
    if rows >= train_window + test_window {
        return (train_window, test_window);
    }
    let train = MIN_SHRUNK_TRAIN.max((0.6 * rows as f64) as usize);
    let test = MIN_SHRUNK_TEST.max((0.1 * rows as f64) as usize);
    (train, test)
}

/// Keep only the most recent `max_folds` folds, renumbered from zero.
pub fn keep_recent(folds: Vec<Fold>, max_folds: Option<usize>) -> Vec<Fold> {
    let Some(max) = max_folds else {
        return folds;
    };
    let skip = folds.len().saturating_sub(max);
    folds
        .into_iter()
        .skip(skip)
        .enumerate()
        .map(|(i, f)| Fold { index: i, ..f })
        .collect()
}

/// Plan the folds for `rows` usable rows: shrink the windows if needed,
/// split, and keep the most recent `max_folds`.
pub fn plan_folds(
    rows: usize,
    train_window: usize,
    test_window: usize,
    min_train: usize,
    max_folds: Option<usize>,
) -> Result<Vec<Fold>, WalkForwardError> {
    if train_window == 0 || test_window == 0 {
        return Err(WalkForwardError::ZeroWindow {
            train: train_window,
            test: test_window,
        });
    }
    let (train, test) = shrink_windows(rows, train_window, test_window);
    let folds: Vec<Fold> = walk_forward_splits(rows, train, test, Some(min_train)).collect();
    if folds.is_empty() {
        return Err(WalkForwardError::NoFolds { rows, train, test });
    }
    let folds = keep_recent(folds, max_folds);
    tracing::debug!(rows, train, test, folds = folds.len(), "walk-forward folds planned");
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(folds: &[Fold]) -> Vec<((usize, usize), (usize, usize))> {
        folds
            .iter()
            .map(|f| ((f.train.start, f.train.end), (f.test.start, f.test.end)))
            .collect()
    }

    #[test]
    fn thousand_rows_make_three_folds() {
        let folds: Vec<Fold> = walk_forward_splits(1000, 750, 63, Some(250)).collect();
        assert_eq!(
            bounds(&folds),
            vec![
                ((0, 750), (750, 813)),
                ((63, 813), (813, 876)),
                ((126, 876), (876, 939)),
            ]
        );
        assert_eq!(folds[2].index, 2);
    }

    #[test]
    fn exact_fit_yields_one_fold() {
        let folds: Vec<Fold> = walk_forward_splits(813, 750, 63, None).collect();
        assert_eq!(folds.len(), 1);
        assert_eq!(walk_forward_splits(812, 750, 63, None).count(), 0);
    }

    #[test]
    fn zero_test_window_yields_nothing() {
        assert_eq!(walk_forward_splits(100, 10, 0, None).count(), 0);
    }

    #[test]
    fn min_train_skips_short_train_windows() {
        assert_eq!(walk_forward_splits(100, 10, 5, Some(11)).count(), 0);
        assert_eq!(walk_forward_splits(100, 10, 5, Some(10)).count(), 18);
    }

    #[test]
    fn shrink_only_when_short() {
        assert_eq!(shrink_windows(1000, 750, 63), (750, 63));
        assert_eq!(shrink_windows(600, 750, 63), (360, 60));
        assert_eq!(shrink_windows(300, 750, 63), (250, 30));
        assert_eq!(shrink_windows(100, 750, 63), (250, 21));
    }

    #[test]
    fn keep_recent_drops_earliest() {
        let folds: Vec<Fold> = walk_forward_splits(1000, 750, 63, None).collect();
        let kept = keep_recent(folds.clone(), Some(2));
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].train, folds[1].train);
        assert_eq!(kept[0].index, 0);
        assert_eq!(keep_recent(folds.clone(), Some(10)).len(), 3);
        assert_eq!(keep_recent(folds, None).len(), 3);
    }

    #[test]
    fn plan_reports_no_folds() {
        assert_eq!(
            plan_folds(200, 750, 63, 250, None),
            Err(WalkForwardError::NoFolds {
                rows: 200,
                train: 250,
                test: 21
            })
        );
        assert!(matches!(
            plan_folds(200, 0, 63, 250, None),
            Err(WalkForwardError::ZeroWindow { .. })
        ));
        let folds = plan_folds(600, 750, 63, 250, None).unwrap();
        assert_eq!(folds[0].train, 0..360);
        assert_eq!(folds[0].test, 360..420);
    }
}
