//! Ranked access to bounded-size subsets.
//!
//! The failure-environment space of a network with `n` symbolic links and a
//! failure budget of `k` is the set of all subsets of `{0..n}` with at most
//! `k` elements. These helpers biject a flat integer onto that space so the
//! samplers get O(1) random access and ordered enumeration without ever
//! materializing the subsets.
//!
//! Subsets of a fixed size `k` are numbered by the descending-enumeration
//! ordering: the subset containing the largest feasible elements first.
//! `nth_combination` and `index_of_combination` are mutual inverses under
//! that numbering.

use std::collections::BTreeSet;

/// The number of ways to choose `k` items from `n` items.
///
/// Multiplicative formula with symmetry reduction to `min(k, n - k)`;
/// every intermediate product is an exact integer.
pub fn choose(n: u64, k: u64) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    if k == 0 {
        return 1;
    }
    let mut acc = n as u128;
    let mut factor = (n - 1) as u128;
    for i in 2..=(k as u128) {
        acc = acc * factor / i;
        factor -= 1;
    }
    acc
}

/// Total number of subsets of `{0..n}` with at most `max_k` elements.
pub fn num_items(n: u64, max_k: u64) -> u128 {
    (0..=max_k).map(|k| choose(n, k)).sum()
}

/// Locate the k-substratum a flat item index falls in.
///
/// Items are laid out stratum by stratum: first the single empty subset,
/// then all 1-subsets, and so on. Returns the index within the stratum and
/// the stratum's subset size. An item beyond the last stratum saturates to
/// the final entry, mirroring the layout's closed upper end.
pub fn map_item_to_index(item: u128, n: u64, max_k: u64) -> (u128, u64) {
    let mut item = item;
    for k in 0..=max_k {
        let stratum = choose(n, k);
        if item >= stratum {
            item -= stratum;
        } else {
            return (item, k);
        }
    }
    (choose(n, max_k) - 1, max_k)
}

/// Decode the `index`-th k-subset of `{0..n}` under the
/// descending-enumeration numbering.
///
/// Greedily picks the largest element that keeps the remaining budget
/// feasible, updating the running binomial coefficient incrementally with
/// exact integer steps.
pub fn nth_combination(index: u128, n: u64, k: u64) -> BTreeSet<u64> {
    let mut n = n as u128;
    let mut n_choose_k: u128 = 1;
    let mut num = n;
    for i in 1..=(k as u128) {
        n_choose_k = n_choose_k * num / i;
        num -= 1;
    }
    let mut curr_index = n_choose_k;

    let mut combination = BTreeSet::new();
    let mut k = k as u128;
    while k > 0 {
        n_choose_k = n_choose_k * k / n;
        while curr_index - n_choose_k > index {
            curr_index -= n_choose_k;
            n_choose_k *= n - k;
            n_choose_k -= n_choose_k % k;
            n -= 1;
            n_choose_k /= n;
        }
        n -= 1;
        combination.insert(n as u64);
        k -= 1;
    }
    combination
}

/// Inverse of [`nth_combination`]: the index a combination has under the
/// descending-enumeration numbering. Items must be in ascending order and
/// drawn from `{0..n}`; the ambient `n` does not affect the result.
pub fn index_of_combination<I>(combination: I) -> u128
where
    I: IntoIterator<Item = u64>,
{
    combination
        .into_iter()
        .enumerate()
        .map(|(i, a)| choose(a, i as u64 + 1))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn factorial(n: u64) -> u128 {
        (1..=n as u128).product()
    }

    #[test]
    fn choose_matches_factorial_definition() {
        for n in 0..=27u64 {
            for k in 0..=n {
                let expected = factorial(n) / (factorial(k) * factorial(n - k));
                assert_eq!(choose(n, k), expected, "C({n}, {k})");
            }
        }
    }

    #[test]
    fn choose_is_zero_beyond_n() {
        assert_eq!(choose(5, 6), 0);
        assert_eq!(choose(0, 1), 0);
    }

    #[test]
    fn num_items_is_the_stratum_sum() {
        for n in 1..=25u64 {
            for max_k in 0..=n {
                let expected: u128 = (0..=max_k).map(|k| choose(n, k)).sum();
                assert_eq!(num_items(n, max_k), expected);
            }
        }
    }

    #[test]
    fn map_item_to_index_strata() {
        let cases = [
            (0u128, 100u64, 3u64, 0u128, 0u64),
            (1, 100, 3, 0, 1),
            (59, 100, 3, 58, 1),
            (99, 100, 3, 98, 1),
            (100, 100, 3, 99, 1),
            (101, 100, 3, 0, 2),
            (115, 100, 3, 14, 2),
            (4500, 100, 3, 4399, 2),
            (10000, 100, 3, 4949, 3),
            (166750, 100, 3, 161699, 3),
            (166751, 100, 3, 161699, 3),
            (300000, 100, 3, 161699, 3),
        ];
        for (item, n, max_k, index, k) in cases {
            assert_eq!(map_item_to_index(item, n, max_k), (index, k));
        }
    }

    #[test]
    fn nth_combination_literals() {
        let cases: [(u128, u64, u64, &[u64]); 3] = [
            (0, 10, 3, &[0, 1, 2]),
            (5, 10, 3, &[0, 2, 4]),
            (19, 10, 3, &[3, 4, 5]),
        ];
        for (index, n, k, expected) in cases {
            let combination = nth_combination(index, n, k);
            assert_eq!(
                combination.iter().copied().collect::<Vec<_>>(),
                expected,
                "combination {index} of C({n}, {k})"
            );
            assert_eq!(index_of_combination(combination), index);
        }
    }

    #[test]
    fn zero_sized_combination_is_empty() {
        assert!(nth_combination(0, 10, 0).is_empty());
        assert_eq!(index_of_combination(std::iter::empty()), 0);
    }

    proptest! {
        #[test]
        fn index_round_trips(
            (n, k, index) in (1..18u64)
                .prop_flat_map(|n| (Just(n), 0..=n))
                .prop_flat_map(|(n, k)| {
                    let count = choose(n, k);
                    (Just(n), Just(k), 0..count.max(1))
                })
        ) {
            let combination = nth_combination(index, n, k);
            prop_assert_eq!(combination.len() as u64, k);
            prop_assert!(combination.iter().all(|&item| item < n));
            prop_assert_eq!(index_of_combination(combination), index);
        }
    }
}
