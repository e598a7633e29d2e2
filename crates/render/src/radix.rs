//! Stable LSB radix sort producing index permutations.

use std::ops::Range;

/// Fixed-width unsigned key sortable byte by byte.
pub trait RadixKey: Copy + Eq {
    const BYTES: usize;

    fn byte(self, pass: usize) -> u8;
}

impl RadixKey for u32 {
    const BYTES: usize = 4;

    fn byte(self, pass: usize) -> u8 {
        (self >> (pass * 8)) as u8
    }
}

impl RadixKey for u64 {
    const BYTES: usize = 8;

    fn byte(self, pass: usize) -> u8 {
        (self >> (pass * 8)) as u8
    }
}

/// Run of consecutive input elements sharing a key.
#[derive(Debug, Clone, Copy)]
struct Span<K> {
    key: K,
    base: u32,
    count: u32,
}

/// Radix sorter with reusable scratch.
///
/// Runs of equal adjacent keys are collapsed before sorting and expanded
/// afterwards, so already-grouped input costs little.
#[derive(Debug)]
pub struct RadixSorter<K> {
    spans: Vec<Span<K>>,
    scratch: Vec<Span<K>>,
}

impl<K> Default for RadixSorter<K> {
    fn default() -> Self {
        Self {
            spans: Vec::new(),
            scratch: Vec::new(),
        }
    }
}

impl<K: RadixKey> RadixSorter<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `out` with the stable ascending permutation of `items`.
    pub fn sort_by<T>(&mut self, items: &[T], key: impl Fn(&T) -> K, out: &mut Vec<u32>) {
        out.clear();
        self.sort_range_by(items, 0..items.len(), key, out);
    }

    /// Append the sorted permutation of `items[range]` to `out`, as indices
    /// into `items`.
    pub fn sort_range_by<T>(
        &mut self,
        items: &[T],
        range: Range<usize>,
        key: impl Fn(&T) -> K,
        out: &mut Vec<u32>,
    ) {
        let start = range.start as u32;
        let slice = &items[range];
        self.spans.clear();
        for (i, item) in slice.iter().enumerate() {
            let k = key(item);
            match self.spans.last_mut() {
                Some(span) if span.key == k => span.count += 1,
                _ => self.spans.push(Span {
                    key: k,
                    base: i as u32,
                    count: 1,
                }),
            }
        }

        self.sort_spans();

        out.reserve(slice.len());
        for span in &self.spans {
            out.extend((span.base..span.base + span.count).map(|i| start + i));
        }
    }

    fn sort_spans(&mut self) {
        let n = self.spans.len();
        if n < 2 {
            return;
        }
        self.scratch.clear();
        self.scratch.resize(n, self.spans[0]);

        for pass in 0..K::BYTES {
            let mut counts = [0usize; 256];
            for span in &self.spans {
                counts[span.key.byte(pass) as usize] += 1;
            }
            // Every key shares this byte.
            if counts.contains(&n) {
                continue;
            }
            let mut offset = 0;
            for c in counts.iter_mut() {
                let here = *c;
                *c = offset;
                offset += here;
            }
            for span in &self.spans {
                let slot = &mut counts[span.key.byte(pass) as usize];
                self.scratch[*slot] = *span;
                *slot += 1;
            }
            std::mem::swap(&mut self.spans, &mut self.scratch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random(n: usize, mut seed: u64) -> Vec<u64> {
        (0..n)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                seed >> 40
            })
            .collect()
    }

    fn assert_sorted_permutation(keys: &[u64], order: &[u32]) {
        assert_eq!(order.len(), keys.len());
        let mut seen = vec![false; keys.len()];
        for &i in order {
            assert!(!seen[i as usize], "index {i} repeated");
            seen[i as usize] = true;
        }
        assert!(order.windows(2).all(|w| keys[w[0] as usize] <= keys[w[1] as usize]));
    }

    #[test]
    fn sorts_random_keys() {
        let keys = pseudo_random(2000, 7);
        let mut sorter = RadixSorter::new();
        let mut order = Vec::new();
        sorter.sort_by(&keys, |&k| k, &mut order);
        assert_sorted_permutation(&keys, &order);
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let keys: Vec<u32> = vec![3, 1, 3, 3, 0, 1, 0xffff_0000];
        let mut sorter = RadixSorter::new();
        let mut order = Vec::new();
        sorter.sort_by(&keys, |&k| k, &mut order);
        assert_eq!(order, vec![4, 1, 5, 0, 2, 3, 6]);
    }

    #[test]
    fn range_indices_are_absolute() {
        let keys: Vec<u64> = vec![9, 9, 5, 4, 6, 1];
        let mut sorter = RadixSorter::new();
        let mut order = vec![0, 1];
        sorter.sort_range_by(&keys, 2..5, |&k| k, &mut order);
        assert_eq!(order, vec![0, 1, 3, 2, 4]);
    }

    #[test]
    fn empty_and_single() {
        let mut sorter = RadixSorter::<u64>::new();
        let mut order = vec![42];
        sorter.sort_by::<u64>(&[], |&k| k, &mut order);
        assert!(order.is_empty());
        sorter.sort_by(&[7u64], |&k| k, &mut order);
        assert_eq!(order, vec![0]);
    }
}
