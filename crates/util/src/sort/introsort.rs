//! Introspective sort.
//!
//! Quicksort with median-of-three pivots (Tukey's ninther on ranges longer
//! than 40), insertion sort for ranges of 12 or fewer, and a heapsort fallback
//! once the recursion depth reaches `2 * ceil(log2(n + 1))`. Not stable.

use super::insertion::insertion_sort_range;

const INSERTION_THRESHOLD: usize = 12;
const NINTHER_THRESHOLD: usize = 40;

/// Recursion budget before switching to heapsort: `2 * ceil(log2(n + 1))`.
pub fn max_depth(n: usize) -> usize {
    let mut depth = 0;
    let mut i = n;
    while i > 0 {
        depth += 1;
        i >>= 1;
    }
    depth * 2
}

/// Sorts `data` in place with a strict "less than" predicate.
///
/// # Examples
///
/// ```
/// use packstream_util::sort::introsort_by;
///
/// let mut arr: Vec<u32> = (0..100).rev().collect();
/// introsort_by(&mut arr, |a, b| a < b);
/// assert_eq!(arr, (0..100).collect::<Vec<u32>>());
/// ```
pub fn introsort_by<T, F>(data: &mut [T], mut less: F)
where
    F: FnMut(&T, &T) -> bool,
{
    let n = data.len();
    quick_sort(data, 0, n, max_depth(n), &mut less);
}

/// Sorts items by the byte-lexicographic order of a borrowed key.
///
/// ```
/// use packstream_util::sort::sort_by_bytes;
///
/// let mut keys = vec!["b", "ab", "a", "B"];
/// sort_by_bytes(&mut keys, |k| k.as_bytes());
/// assert_eq!(keys, vec!["B", "a", "ab", "b"]);
/// ```
pub fn sort_by_bytes<T, F>(data: &mut [T], key: F)
where
    F: Fn(&T) -> &[u8],
{
    introsort_by(data, |a, b| key(a) < key(b));
}

fn quick_sort<T, F>(data: &mut [T], mut a: usize, mut b: usize, mut depth: usize, less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    while b - a > INSERTION_THRESHOLD {
        if depth == 0 {
            heap_sort(data, a, b, less);
            return;
        }
        depth -= 1;
        let (mlo, mhi) = do_pivot(data, a, b, less);
        // Recurse into the smaller side, loop on the larger one.
        if mlo - a < b - mhi {
            quick_sort(data, a, mlo, depth, less);
            a = mhi;
        } else {
            quick_sort(data, mhi, b, depth, less);
            b = mlo;
        }
    }
    if b - a > 1 {
        // Shell pass with gap 6 before the final insertion sort.
        for i in a + 6..b {
            if less(&data[i], &data[i - 6]) {
                data.swap(i, i - 6);
            }
        }
        insertion_sort_range(data, a, b, less);
    }
}

/// Orders `data[m0] <= data[m1] <= data[m2]`.
fn median_of_three<T, F>(data: &mut [T], m1: usize, m0: usize, m2: usize, less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    if less(&data[m1], &data[m0]) {
        data.swap(m1, m0);
    }
    if less(&data[m2], &data[m1]) {
        data.swap(m2, m1);
        if less(&data[m1], &data[m0]) {
            data.swap(m1, m0);
        }
    }
}

/// Partitions `data[lo..hi]` around a pivot and returns the bounds of the
/// pivot-equal middle block.
fn do_pivot<T, F>(data: &mut [T], lo: usize, hi: usize, less: &mut F) -> (usize, usize)
where
    F: FnMut(&T, &T) -> bool,
{
    let m = lo + (hi - lo) / 2;
    if hi - lo > NINTHER_THRESHOLD {
        let s = (hi - lo) / 8;
        median_of_three(data, lo, lo + s, lo + 2 * s, less);
        median_of_three(data, m, m - s, m + s, less);
        median_of_three(data, hi - 1, hi - 1 - s, hi - 1 - 2 * s, less);
    }
    median_of_three(data, lo, m, hi - 1, less);

    // data[lo] = pivot
    // data[lo < i < a] < pivot
    // data[a <= i < b] <= pivot
    // data[b <= i < c] unexamined
    // data[c <= i < hi - 1] > pivot
    // data[hi - 1] >= pivot
    let pivot = lo;
    let (mut a, mut c) = (lo + 1, hi - 1);

    while a < c && less(&data[a], &data[pivot]) {
        a += 1;
    }
    let mut b = a;
    loop {
        while b < c && !less(&data[pivot], &data[b]) {
            b += 1;
        }
        while b < c && less(&data[pivot], &data[c - 1]) {
            c -= 1;
        }
        if b >= c {
            break;
        }
        data.swap(b, c - 1);
        b += 1;
        c -= 1;
    }

    // Few elements above the pivot hints at many duplicates.
    let mut protect = hi - c < 5;
    if !protect && hi - c < (hi - lo) / 4 {
        let mut dups = 0;
        if !less(&data[pivot], &data[hi - 1]) {
            data.swap(c, hi - 1);
            c += 1;
            dups += 1;
        }
        if !less(&data[b - 1], &data[pivot]) {
            b -= 1;
            dups += 1;
        }
        if !less(&data[m], &data[pivot]) {
            data.swap(m, b - 1);
            b -= 1;
            dups += 1;
        }
        protect = dups > 1;
    }
    if protect {
        // data[a <= i < b] unexamined
        // data[b <= i < c] = pivot
        loop {
            while a < b && !less(&data[b - 1], &data[pivot]) {
                b -= 1;
            }
            while a < b && less(&data[a], &data[pivot]) {
                a += 1;
            }
            if a >= b {
                break;
            }
            data.swap(a, b - 1);
            a += 1;
            b -= 1;
        }
    }
    data.swap(pivot, b - 1);
    (b - 1, c)
}

fn heap_sort<T, F>(data: &mut [T], a: usize, b: usize, less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    let first = a;
    let hi = b - a;
    for i in (0..=(hi - 1) / 2).rev() {
        sift_down(data, i, hi, first, less);
    }
    for i in (0..hi).rev() {
        data.swap(first, first + i);
        sift_down(data, 0, i, first, less);
    }
}

fn sift_down<T, F>(data: &mut [T], lo: usize, hi: usize, first: usize, less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    let mut root = lo;
    loop {
        let mut child = 2 * root + 1;
        if child >= hi {
            return;
        }
        if child + 1 < hi && less(&data[first + child], &data[first + child + 1]) {
            child += 1;
        }
        if !less(&data[first + root], &data[first + child]) {
            return;
        }
        data.swap(first + root, first + child);
        root = child;
    }
}
