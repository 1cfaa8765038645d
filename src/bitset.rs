//! Compact bitset over label indices.
//!
//! # Overview
//! Used in two places: the split sets of [`ForestSnapshot`](crate::snapshot::ForestSnapshot)
//! and the protected-label set carried by every search state. Each bit position
//! corresponds to one working label.
//!
//! # Example
//! With labels [A, B, C, D] interned as [0, 1, 2, 3]:
//! - Split {A, C} → bitset `0b0101`
//! - Protected {B, C, D} → bitset `0b1110`

/// Bits packed into `u64` words; the word vector grows on demand when a label
/// beyond the current capacity is inserted.
///
/// # Memory efficiency
/// Search states are cloned at every branch, so the protected set must stay a
/// flat vector: 8 bytes per 64 labels.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a bitset of `words` zeroed words.
    ///
    /// # Example
    /// ```
    /// # use rust_python_uspr::bitset::Bitset;
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Creates a zeroed bitset able to hold labels `0..bits` without growing.
    pub fn with_capacity(bits: usize) -> Self {
        Self::zeros(bits.div_ceil(64))
    }

    /// Sets the bit at `idx`, growing the word vector if needed.
    ///
    /// # Example
    /// ```
    /// # use rust_python_uspr::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// bs.set(70);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;
        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1u64 << (idx & 63);
    }

    /// Clears the bit at `idx`. Out-of-range indices are already clear.
    #[inline]
    pub fn unset(&mut self, idx: usize) {
        if let Some(w) = self.0.get_mut(idx >> 6) {
            *w &= !(1u64 << (idx & 63));
        }
    }

    /// Whether the bit at `idx` is set.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.0
            .get(idx >> 6)
            .is_some_and(|w| w & (1u64 << (idx & 63)) != 0)
    }

    /// Union in place: `self` becomes `self ∪ other`.
    ///
    /// # Example
    /// ```
    /// # use rust_python_uspr::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);
    /// left.or_assign(&right);
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Number of set bits.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of the set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &word)| {
            (0..64).filter(move |b| word & (1u64 << b) != 0).map(move |b| (w << 6) | b)
        })
    }
}
