/// Insertion sort for slices with natural ordering.
///
/// Faster than the general sorts for short runs; [`super::introsort_by`]
/// hands every range of 12 elements or fewer to this routine.
///
/// # Examples
///
/// ```
/// use packstream_util::sort::insertion_sort;
///
/// let mut arr = vec![3, 1, 4, 1, 5, 9, 2, 6];
/// insertion_sort(&mut arr);
/// assert_eq!(arr, vec![1, 1, 2, 3, 4, 5, 6, 9]);
/// ```
pub fn insertion_sort<T: Ord>(arr: &mut [T]) {
    insertion_sort_by(arr, |a, b| a < b);
}

/// Insertion sort driven by a strict "less than" predicate.
///
/// The sort is stable.
///
/// # Examples
///
/// ```
/// use packstream_util::sort::insertion_sort_by;
///
/// let mut arr = vec![3, 1, 4, 1, 5];
/// insertion_sort_by(&mut arr, |a, b| a > b); // Descending order
/// assert_eq!(arr, vec![5, 4, 3, 1, 1]);
/// ```
pub fn insertion_sort_by<T, F>(arr: &mut [T], mut less: F)
where
    F: FnMut(&T, &T) -> bool,
{
    insertion_sort_range(arr, 0, arr.len(), &mut less);
}

/// Sorts `arr[a..b]` in place.
pub(crate) fn insertion_sort_range<T, F>(arr: &mut [T], a: usize, b: usize, less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    for i in a + 1..b {
        let mut j = i;
        while j > a && less(&arr[j], &arr[j - 1]) {
            arr.swap(j, j - 1);
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_sort_empty() {
        let mut arr: Vec<i32> = vec![];
        insertion_sort(&mut arr);
        assert!(arr.is_empty());
    }

    #[test]
    fn test_insertion_sort_reverse() {
        let mut arr = vec![5, 4, 3, 2, 1];
        insertion_sort(&mut arr);
        assert_eq!(arr, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_insertion_sort_strings() {
        let mut arr = vec!["banana", "apple", "cherry"];
        insertion_sort(&mut arr);
        assert_eq!(arr, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn test_insertion_sort_is_stable() {
        let mut arr = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')];
        insertion_sort_by(&mut arr, |x, y| x.0 < y.0);
        assert_eq!(arr, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }

    #[test]
    fn test_insertion_sort_range_leaves_outside_untouched() {
        let mut arr = vec![9, 3, 2, 1, 0];
        insertion_sort_range(&mut arr, 1, 4, &mut |a: &i32, b: &i32| a < b);
        assert_eq!(arr, vec![9, 1, 2, 3, 0]);
    }
}
