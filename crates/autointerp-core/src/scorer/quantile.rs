//! Quantile distances reported by the batched scoring service.
//!
//! The service ranks each sample into activation quantiles `1..=10` where 1 is the most
//! activating, and reports `-1` for samples outside every quantile. Displays want "higher is
//! more activating", so distances are inverted around [`INVERSION_BASE`].

use std::cmp::Ordering;

pub const EXCLUDED: f64 = -1.0;
pub const INVERSION_BASE: f64 = 11.0;

pub fn is_excluded(distance: f64) -> bool {
    distance == EXCLUDED
}

pub fn invert_distance(distance: f64) -> f64 {
    if is_excluded(distance) {
        distance
    } else {
        INVERSION_BASE - distance
    }
}

/// Sort descending by (already inverted) distance. Excluded rows go last no matter what the
/// other distances are; the sort is stable.
pub fn sort_by_distance<T>(rows: &mut [T], distance: impl Fn(&T) -> f64) {
    rows.sort_by(|a, b| {
        let (da, db) = (distance(a), distance(b));
        match (is_excluded(da), is_excluded(db)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => db.partial_cmp(&da).unwrap_or(Ordering::Equal),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn inverted_rows_sort_with_excluded_last() {
        let mut rows: Vec<f64> = [1.0, 5.0, 10.0, -1.0].into_iter().map(invert_distance).collect();
        assert_eq!(rows, vec![10.0, 6.0, 1.0, -1.0]);
        rows.reverse();
        sort_by_distance(&mut rows, |d| *d);
        assert_eq!(rows, vec![10.0, 6.0, 1.0, -1.0]);
    }

    #[test]
    fn excluded_sorts_after_values_below_it() {
        let mut rows = vec![-1.0, -3.0, 0.0];
        sort_by_distance(&mut rows, |d| *d);
        assert_eq!(rows, vec![0.0, -3.0, -1.0]);
    }

    proptest! {
        #[test]
        fn inversion_maps_quantiles_into_range(d in 1u8..=10) {
            let inverted = invert_distance(f64::from(d));
            prop_assert_eq!(inverted, 11.0 - f64::from(d));
            prop_assert!((1.0..=10.0).contains(&inverted));
        }

        #[test]
        fn sorted_rows_are_descending_then_excluded(
            rows in proptest::collection::vec(prop_oneof![Just(-1.0), (1u8..=10).prop_map(f64::from)], 0..30)
        ) {
            let mut rows = rows;
            sort_by_distance(&mut rows, |d| *d);
            let first_excluded = rows.iter().position(|d| is_excluded(*d)).unwrap_or(rows.len());
            prop_assert!(rows[first_excluded..].iter().all(|d| is_excluded(*d)));
            prop_assert!(rows[..first_excluded].windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn excluded_is_kept() {
        assert_eq!(invert_distance(EXCLUDED), EXCLUDED);
    }
}
