// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Point lookup over a set of possibly-overlapping address ranges.
//!
//! Module and memory lists in real dumps are not always the tidy disjoint sets the
//! format implies. Unloaded-and-reloaded libraries, partial dumps, and plain
//! corruption all produce overlapping records, and throwing any of them away loses
//! information a stack scan may need. [`RangeIndex`] keeps every range and makes
//! lookup deterministic instead: the smallest range containing the address wins,
//! and ties go to the lower start address.

#[derive(Debug, Clone)]
struct Entry<T> {
    start: u64,
    /// Exclusive.
    end: u64,
    value: T,
}

impl<T> Entry<T> {
    fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// An immutable index from address to the value of the best range containing it.
///
/// Ranges are half-open `[start, end)`. Lookup is a binary search over the sorted
/// starts, followed by a backward scan that a running maximum-end bound cuts off as
/// soon as no earlier range can still reach the address.
#[derive(Debug, Clone, Default)]
pub struct RangeIndex<T> {
    /// Sorted by `(start, end)`.
    entries: Vec<Entry<T>>,
    /// `max_end[i]` is the largest `end` among `entries[..=i]`.
    max_end: Vec<u64>,
}

impl<T> RangeIndex<T> {
    /// Builds an index from `(start, end, value)` triples.
    ///
    /// Empty ranges (`start >= end`) are discarded; everything else is kept,
    /// overlapping or not.
    pub fn from_ranges<I>(ranges: I) -> RangeIndex<T>
    where
        I: IntoIterator<Item = (u64, u64, T)>,
    {
        let mut entries: Vec<Entry<T>> = ranges
            .into_iter()
            .filter(|&(start, end, _)| start < end)
            .map(|(start, end, value)| Entry { start, end, value })
            .collect();
        entries.sort_by_key(|e| (e.start, e.end));

        let mut max_end = Vec::with_capacity(entries.len());
        let mut running = 0;
        for entry in &entries {
            running = running.max(entry.end);
            max_end.push(running);
        }
        RangeIndex { entries, max_end }
    }

    /// The value of the best range containing `addr`, if any.
    pub fn get(&self, addr: u64) -> Option<&T> {
        // Everything at or past this index starts beyond `addr`.
        let bound = self.entries.partition_point(|e| e.start <= addr);
        let mut best: Option<usize> = None;
        let mut i = bound;
        while i > 0 {
            i -= 1;
            if self.max_end[i] <= addr {
                // No range at or before `i` extends past `addr`.
                break;
            }
            let entry = &self.entries[i];
            if entry.end > addr {
                best = match best {
                    None => Some(i),
                    Some(b) => {
                        let cur = (entry.len(), entry.start);
                        let old = (self.entries[b].len(), self.entries[b].start);
                        if cur <= old {
                            Some(i)
                        } else {
                            Some(b)
                        }
                    }
                };
            }
        }
        best.map(|i| &self.entries[i].value)
    }

    /// All ranges, in ascending `(start, end)` order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, &T)> {
        self.entries.iter().map(|e| (e.start, e.end, &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn index(ranges: &[(u64, u64, u32)]) -> RangeIndex<u32> {
        RangeIndex::from_ranges(ranges.iter().copied())
    }

    #[test]
    fn test_simple_lookup() {
        let idx = index(&[(0x1000, 0x2000, 1), (0x3000, 0x4000, 2)]);
        assert_eq!(idx.get(0x1000), Some(&1));
        assert_eq!(idx.get(0x1fff), Some(&1));
        assert_eq!(idx.get(0x2000), None);
        assert_eq!(idx.get(0x3500), Some(&2));
        assert_eq!(idx.get(0xfff), None);
        assert_eq!(idx.get(0x9000), None);
    }

    #[test]
    fn test_empty_ranges_dropped() {
        let idx = index(&[(0x1000, 0x1000, 1), (0x2000, 0x1000, 2)]);
        assert!(idx.is_empty());
        assert_eq!(idx.get(0x1000), None);
    }

    #[test]
    fn test_nested_prefers_smallest() {
        let idx = index(&[(0x1000, 0x3000, 1), (0x1800, 0x2000, 2)]);
        assert_eq!(idx.get(0x1900), Some(&2));
        // Outside the inner range the outer one still answers.
        assert_eq!(idx.get(0x1400), Some(&1));
        assert_eq!(idx.get(0x2500), Some(&1));
    }

    #[test]
    fn test_equal_size_prefers_lower_start() {
        let idx = index(&[(0x1800, 0x2800, 2), (0x1000, 0x2000, 1)]);
        assert_eq!(idx.get(0x1900), Some(&1));
        assert_eq!(idx.get(0x2100), Some(&2));
    }

    #[test]
    fn test_long_low_range_reached_past_short_ones() {
        // The long range starts first in sort order; the backward scan has to get
        // past several short non-matching ranges to find it.
        let idx = index(&[
            (0x1000, 0x9000, 1),
            (0x2000, 0x2100, 2),
            (0x3000, 0x3100, 3),
            (0x4000, 0x4100, 4),
        ]);
        assert_eq!(idx.get(0x8000), Some(&1));
        assert_eq!(idx.get(0x3050), Some(&3));
    }

    #[test]
    fn test_iter_sorted() {
        let idx = index(&[(0x3000, 0x4000, 2), (0x1000, 0x2000, 1)]);
        let starts: Vec<u64> = idx.iter().map(|(s, _, _)| s).collect();
        assert_eq!(starts, vec![0x1000, 0x3000]);
    }
}
