use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::ptr;

use parking_lot::RwLock;
use tracing::debug;

use crate::bitmap::BitArray;
use crate::builder::{DefaultHashBuilder, FilterBuilder};
use crate::error::{Error, Result};

/// The minimum number of bits in a [`Filter`].
pub const MIN_BIT_WIDTH: u64 = 2;

/// The minimum number of position keys in a [`Filter`].
pub const MIN_POSITION_COUNT: u64 = 1;

/// The unsynchronised contents of a [`Filter`].
///
/// All access goes through the lock owned by the wrapping [`Filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilterState {
    pub(crate) bits: BitArray,
    pub(crate) keys: Box<[u64]>,
    pub(crate) count: u64,
}

impl FilterState {
    /// An empty state of `bit_width` bits addressed through `keys`.
    ///
    /// The caller is responsible for validating the parameters.
    pub(crate) fn new(bit_width: u64, keys: Box<[u64]>) -> Result<Self> {
        Ok(Self {
            bits: BitArray::new(bit_width)?,
            keys,
            count: 0,
        })
    }

    pub(crate) fn bit_width(&self) -> u64 {
        self.bits.bit_width()
    }

    /// An empty state sharing the bit width and keys of `self`.
    fn compatible(&self) -> Self {
        Self {
            bits: self.bits.cleared(),
            keys: self.keys.clone(),
            count: 0,
        }
    }

    fn is_compatible(&self, other: &Self) -> bool {
        self.bit_width() == other.bit_width() && self.keys == other.keys
    }

    fn insert_hash(&mut self, hash: u64) {
        let m = self.bits.bit_width();
        for key in self.keys.iter() {
            self.bits.set((hash ^ key) % m);
        }
        self.count = self.count.saturating_add(1);
    }

    fn contains_hash(&self, hash: u64) -> bool {
        let m = self.bits.bit_width();
        self.keys.iter().all(|key| self.bits.get((hash ^ key) % m))
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.bit_width() != other.bit_width() {
            debug!(
                left = self.bit_width(),
                right = other.bit_width(),
                "rejecting union of filters with differing bit widths"
            );
            return Err(Error::Incompatible("bit widths differ"));
        }
        if self.keys != other.keys {
            debug!("rejecting union of filters with differing position keys");
            return Err(Error::Incompatible("position keys differ"));
        }

        self.bits.or_assign(&other.bits);
        self.count = self.count.saturating_add(other.count);
        Ok(())
    }
}

/// A thread-safe bloom filter addressing `k` bit positions per entry by
/// XOR-ing a single 64-bit hash with `k` distinct position keys.
///
/// All methods take `&self` - a `Filter` can be shared between threads (for
/// example in an [`Arc`](std::sync::Arc)) and updated concurrently. Inserts
/// take an exclusive lock for the duration of the bit updates, while lookups
/// share a read lock.
///
/// ```rust
/// use keyed_bloom::Filter;
///
/// let filter = Filter::new_optimal(1_000, 0.01)?;
///
/// filter.add("hello 🐐");
/// assert!(filter.contains("hello 🐐"));
/// assert_eq!(filter.element_count(), 1);
/// # Ok::<(), keyed_bloom::Error>(())
/// ```
///
/// Filters constructed with the same bit width and the same position keys are
/// *compatible*, and can be merged with [`union`](Filter::union) or
/// [`union_in_place`](Filter::union_in_place). Use
/// [`with_keys`](Filter::with_keys) to construct compatible filters in
/// separate processes, or [`new_compatible`](Filter::new_compatible) to derive
/// one from an existing filter.
///
/// Values passed to [`add`](Filter::add) and [`contains`](Filter::contains) are
/// hashed with `S` before any lock is taken. The default hasher is xxHash64
/// with a fixed seed, so a filter decoded in another process answers lookups
/// the same way as the filter that produced it.
pub struct Filter<S = DefaultHashBuilder> {
    pub(crate) state: RwLock<FilterState>,
    pub(crate) hasher: S,
}

impl Filter {
    /// Construct an empty filter of `bit_width` bits with `position_count`
    /// position keys drawn from the operating system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `bit_width` is less than
    /// [`MIN_BIT_WIDTH`] or `position_count` is less than
    /// [`MIN_POSITION_COUNT`] or the filter is too large to allocate, and
    /// [`Error::RandomnessFault`] if the OS randomness source cannot be read.
    pub fn new(bit_width: u64, position_count: u64) -> Result<Self> {
        FilterBuilder::with_size(bit_width, position_count).build()
    }

    /// Construct an empty filter of `bit_width` bits using the caller-supplied
    /// position `keys`.
    ///
    /// Filters built from the same arguments are compatible and can be merged,
    /// regardless of where they were built.
    ///
    /// ```rust
    /// use keyed_bloom::Filter;
    ///
    /// let a = Filter::with_keys(1024, &[1, 2, 3])?;
    /// let b = Filter::with_keys(1024, &[1, 2, 3])?;
    /// assert!(a.is_compatible(&b));
    /// # Ok::<(), keyed_bloom::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `bit_width` is less than
    /// [`MIN_BIT_WIDTH`], `keys` is empty or contains duplicates, or the bit
    /// array is too large to allocate.
    pub fn with_keys(bit_width: u64, keys: &[u64]) -> Result<Self> {
        FilterBuilder::with_keys(bit_width, keys).build()
    }

    /// Construct a filter sized to hold `max_elements` entries with a false
    /// positive probability of `p`, using random position keys.
    ///
    /// See [`sizing`](crate::sizing).
    pub fn new_optimal(max_elements: u64, p: f64) -> Result<Self> {
        FilterBuilder::with_accuracy(max_elements, p).build()
    }
}

impl<S> Filter<S>
where
    S: BuildHasher,
{
    pub(crate) fn from_state(state: FilterState, hasher: S) -> Self {
        Self {
            state: RwLock::new(state),
            hasher,
        }
    }

    /// Insert `value` into the filter.
    ///
    /// Any subsequent calls to [`contains`](Filter::contains) for the same
    /// `value` will always return true.
    ///
    /// The element count is incremented on every call, including repeated
    /// inserts of the same value.
    pub fn add<T: Hash + ?Sized>(&self, value: &T) {
        let hash = self.hasher.hash_one(value);
        self.add_hash(hash);
    }

    /// Insert a precomputed 64-bit `hash` into the filter.
    ///
    /// Identical to [`add`](Filter::add) for a value that hashes to `hash`,
    /// skipping the hash computation.
    pub fn add_hash(&self, hash: u64) {
        self.state.write().insert_hash(hash);
    }

    /// Checks if `value` exists in the filter.
    ///
    /// If `contains` returns true, `value` has **probably** been inserted
    /// previously. If `contains` returns false, `value` has **definitely not**
    /// been inserted into the filter.
    pub fn contains<T: Hash + ?Sized>(&self, value: &T) -> bool {
        let hash = self.hasher.hash_one(value);
        self.contains_hash(hash)
    }

    /// Checks if a precomputed 64-bit `hash` exists in the filter.
    pub fn contains_hash(&self, hash: u64) -> bool {
        self.state.read().contains_hash(hash)
    }

    /// The number of addressable bits (`m`).
    pub fn bit_width(&self) -> u64 {
        self.state.read().bit_width()
    }

    /// The number of bit positions tested per entry (`k`).
    pub fn position_count(&self) -> u64 {
        self.state.read().keys.len() as u64
    }

    /// A copy of the position keys, in order.
    pub fn keys(&self) -> Vec<u64> {
        self.state.read().keys.to_vec()
    }

    /// The number of inserts performed against this filter (and any filters
    /// merged into it).
    ///
    /// This is advisory - duplicate inserts are counted every time.
    pub fn element_count(&self) -> u64 {
        self.state.read().count
    }

    /// A copy of the bit array words, least significant bit first.
    pub fn words(&self) -> Vec<u64> {
        self.state.read().bits.words().to_vec()
    }

    /// The hash builder used by [`add`](Filter::add) and
    /// [`contains`](Filter::contains).
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Returns true if `self` and `other` share the same bit width and the same
    /// position keys, in the same order.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.with_both(other, |a, b| a.is_compatible(b))
    }

    /// Merge all entries in `other` into `self`.
    ///
    /// After the merge `self` contains every value inserted into either
    /// filter, and its element count is the sum of both counts. `other` is
    /// not modified.
    ///
    /// ```rust
    /// use keyed_bloom::Filter;
    ///
    /// let a = Filter::with_keys(1024, &[1, 2, 3])?;
    /// let b = a.new_compatible();
    ///
    /// a.add("bananas");
    /// b.add("platanos");
    ///
    /// a.union_in_place(&b)?;
    /// assert!(a.contains("bananas"));
    /// assert!(a.contains("platanos"));
    /// # Ok::<(), keyed_bloom::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Incompatible`] without modifying either filter if the
    /// two are not [compatible](Filter::is_compatible).
    pub fn union_in_place(&self, other: &Self) -> Result<()> {
        if ptr::eq(self, other) {
            // OR-ing a filter with itself leaves the bits unchanged.
            let mut state = self.state.write();
            state.count = state.count.saturating_add(state.count);
            return Ok(());
        }

        // Both locks are always taken in address order so that concurrent
        // a.union_in_place(b) and b.union_in_place(a) calls cannot deadlock.
        if self.locks_before(other) {
            let mut dst = self.state.write();
            let src = other.state.read();
            dst.merge(&src)
        } else {
            let src = other.state.read();
            let mut dst = self.state.write();
            dst.merge(&src)
        }
    }

    /// Returns true if `self` must be locked before `other`.
    fn locks_before(&self, other: &Self) -> bool {
        (self as *const Self) < (other as *const Self)
    }

    /// Call `f` with read access to the state of both filters, taking the
    /// locks in address order.
    fn with_both<R>(&self, other: &Self, f: impl FnOnce(&FilterState, &FilterState) -> R) -> R {
        if ptr::eq(self, other) {
            let state = self.state.read();
            return f(&state, &state);
        }

        if self.locks_before(other) {
            let a = self.state.read();
            let b = other.state.read();
            f(&a, &b)
        } else {
            let b = other.state.read();
            let a = self.state.read();
            f(&a, &b)
        }
    }
}

impl<S> Filter<S>
where
    S: BuildHasher + Clone,
{
    /// Construct an empty filter with the same bit width, position keys and
    /// hasher as `self`.
    pub fn new_compatible(&self) -> Self {
        let state = self.state.read().compatible();
        Self::from_state(state, self.hasher.clone())
    }

    /// Return a new filter containing the entries of both `self` and `other`.
    ///
    /// Neither input is modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Incompatible`] if the two are not
    /// [compatible](Filter::is_compatible).
    pub fn union(&self, other: &Self) -> Result<Self> {
        let state = self.with_both(other, |a, b| {
            if !a.is_compatible(b) {
                return Err(if a.bit_width() != b.bit_width() {
                    Error::Incompatible("bit widths differ")
                } else {
                    Error::Incompatible("position keys differ")
                });
            }

            Ok(FilterState {
                bits: a.bits.or(&b.bits),
                keys: a.keys.clone(),
                count: a.count.saturating_add(b.count),
            })
        })?;

        Ok(Self::from_state(state, self.hasher.clone()))
    }
}

/// Produces an independent copy of the filter, sharing no storage with the
/// original.
impl<S> Clone for Filter<S>
where
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let state = self.state.read().clone();
        Self::from_state(state, self.hasher.clone())
    }
}

impl<S> fmt::Debug for Filter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Filter")
            .field("bit_width", &state.bit_width())
            .field("keys", &state.keys)
            .field("count", &state.count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::hash::Hasher;

    #[derive(Debug, Clone, Default)]
    struct MockHasher {
        return_hash: u64,
    }

    impl Hasher for MockHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            self.return_hash
        }
    }

    impl BuildHasher for MockHasher {
        type Hasher = Self;
        fn build_hasher(&self) -> MockHasher {
            self.clone()
        }
    }

    fn set_positions(f: &Filter<impl BuildHasher>) -> Vec<u64> {
        let words = f.words();
        (0..f.bit_width())
            .filter(|&i| words[(i / 64) as usize] & (1 << (i % 64)) != 0)
            .collect()
    }

    #[test]
    fn test_add_hash_positions() {
        let f = Filter::with_keys(64, &[1, 2, 3]).unwrap();
        f.add_hash(42);

        // (42 ^ 1) % 64, (42 ^ 2) % 64, (42 ^ 3) % 64
        assert_eq!(set_positions(&f), vec![40, 41, 43]);
        assert_eq!(f.words(), vec![(1 << 40) | (1 << 41) | (1 << 43)]);

        assert!(f.contains_hash(42));
        assert!(!f.contains_hash(7));
        assert_eq!(f.element_count(), 1);
    }

    #[test]
    fn test_add_uses_hasher() {
        let f = FilterBuilder::with_keys(64, &[1, 2, 3])
            .hasher(MockHasher { return_hash: 42 })
            .build()
            .unwrap();

        f.add(&[1, 2, 3, 4]);
        assert_eq!(set_positions(&f), vec![40, 41, 43]);

        // Everything hashes to 42.
        assert!(f.contains("anything"));
        assert!(f.contains_hash(42));
    }

    #[test]
    fn test_duplicate_inserts_counted() {
        let f = Filter::with_keys(128, &[10, 20]).unwrap();
        f.add(&"dup");
        f.add(&"dup");
        f.add_hash(1);

        assert_eq!(f.element_count(), 3);
    }

    #[test]
    fn test_minimum_boundary() {
        assert!(matches!(Filter::new(1, 1), Err(Error::Configuration(_))));
        assert!(matches!(Filter::new(2, 0), Err(Error::Configuration(_))));

        let f = Filter::new(2, 1).unwrap();
        assert_eq!(f.bit_width(), 2);
        assert_eq!(f.position_count(), 1);
    }

    #[test]
    fn test_unallocatable_shape() {
        // Valid by the minimums, but far too large to allocate.
        assert!(matches!(
            Filter::new(64, u64::MAX),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Filter::new(u64::MAX, 1),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Filter::with_keys(u64::MAX, &[1]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_with_keys_rejects() {
        assert!(matches!(
            Filter::with_keys(64, &[1, 2, 1]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Filter::with_keys(64, &[]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Filter::with_keys(1, &[1]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_keys_is_a_copy() {
        let f = Filter::with_keys(64, &[5, 6, 7]).unwrap();
        let mut keys = f.keys();
        keys[0] = 42;

        assert_eq!(f.keys(), vec![5, 6, 7]);
        assert_eq!(f.position_count(), 3);
    }

    #[test]
    fn test_clone_is_independent() {
        let f = Filter::with_keys(256, &[1, 2, 3]).unwrap();
        f.add(&"a");

        let copy = f.clone();
        copy.add(&"b");

        assert!(copy.contains(&"a"));
        assert!(copy.contains(&"b"));
        assert_eq!(copy.element_count(), 2);

        assert_eq!(f.element_count(), 1);
        assert_ne!(f.words(), copy.words());
        assert_eq!(f.keys(), copy.keys());
    }

    #[test]
    fn test_new_compatible() {
        let f = Filter::new(512, 4).unwrap();
        f.add(&"a");

        let g = f.new_compatible();
        assert!(f.is_compatible(&g));
        assert_eq!(g.element_count(), 0);
        assert!(g.words().iter().all(|w| *w == 0));
    }

    #[test]
    fn test_incompatible_width() {
        let a = Filter::with_keys(1024, &[1, 2, 3]).unwrap();
        let b = Filter::with_keys(2048, &[1, 2, 3]).unwrap();
        a.add(&"a");
        b.add(&"b");

        let (a_words, b_words) = (a.words(), b.words());

        assert!(!a.is_compatible(&b));
        assert!(matches!(a.union(&b), Err(Error::Incompatible(_))));
        assert!(matches!(a.union_in_place(&b), Err(Error::Incompatible(_))));
        assert!(matches!(b.union_in_place(&a), Err(Error::Incompatible(_))));

        // Neither filter was modified.
        assert_eq!(a.words(), a_words);
        assert_eq!(b.words(), b_words);
        assert_eq!(a.element_count(), 1);
        assert_eq!(b.element_count(), 1);
    }

    #[test]
    fn test_incompatible_keys() {
        // Same width, different key order.
        let a = Filter::with_keys(1024, &[1, 2, 3]).unwrap();
        let b = Filter::with_keys(1024, &[3, 2, 1]).unwrap();
        assert!(!a.is_compatible(&b));
        assert!(matches!(a.union(&b), Err(Error::Incompatible(_))));

        // Same width, different key count.
        let c = Filter::with_keys(1024, &[1, 2]).unwrap();
        assert!(matches!(a.union_in_place(&c), Err(Error::Incompatible(_))));
    }

    #[test]
    fn test_union_in_place() {
        let a = Filter::with_keys(1024, &[1, 2, 3]).unwrap();
        let b = a.new_compatible();
        a.add(&"a");
        b.add(&"b");
        b.add(&"c");

        a.union_in_place(&b).unwrap();
        assert!(a.contains(&"a"));
        assert!(a.contains(&"b"));
        assert!(a.contains(&"c"));
        assert_eq!(a.element_count(), 3);

        // b is untouched.
        assert_eq!(b.element_count(), 2);
        assert!(!b.contains(&"a"));
    }

    #[test]
    fn test_union_with_self() {
        let a = Filter::with_keys(1024, &[1, 2, 3]).unwrap();
        a.add(&"a");
        let words = a.words();

        let u = a.union(&a).unwrap();
        assert_eq!(u.words(), words);
        assert_eq!(u.element_count(), 2);

        a.union_in_place(&a).unwrap();
        assert_eq!(a.words(), words);
        assert_eq!(a.element_count(), 2);
    }

    #[quickcheck]
    fn prop_no_false_negatives(vals: Vec<u64>) -> bool {
        let f = Filter::with_keys(4096, &[11, 22, 33, 44]).unwrap();
        for v in &vals {
            f.add(v);
        }

        vals.iter().all(|v| f.contains(v)) && f.element_count() == vals.len() as u64
    }

    #[quickcheck]
    fn prop_add_hash_matches_add(vals: Vec<String>) -> bool {
        let a = Filter::with_keys(2048, &[7, 8, 9]).unwrap();
        let b = a.new_compatible();

        for v in &vals {
            a.add(v.as_str());
            b.add_hash(b.hasher().hash_one(v.as_str()));
        }

        a.words() == b.words()
    }

    #[quickcheck]
    fn prop_union_commutative_associative(a: Vec<u32>, b: Vec<u32>, c: Vec<u32>) -> bool {
        let fa = Filter::with_keys(1000, &[3, 5, 7]).unwrap();
        let fb = fa.new_compatible();
        let fc = fa.new_compatible();

        a.iter().for_each(|v| fa.add(v));
        b.iter().for_each(|v| fb.add(v));
        c.iter().for_each(|v| fc.add(v));

        let ab = fa.union(&fb).unwrap();
        let ba = fb.union(&fa).unwrap();

        let ab_c = ab.union(&fc).unwrap();
        let a_bc = fa.union(&fb.union(&fc).unwrap()).unwrap();

        ab.words() == ba.words()
            && ab_c.words() == a_bc.words()
            && ab_c.element_count() == (a.len() + b.len() + c.len()) as u64
    }

    #[quickcheck]
    fn prop_union_sound(a: Vec<u64>, b: Vec<u64>, probes: Vec<u64>) -> bool {
        let fa = Filter::with_keys(512, &[100, 200]).unwrap();
        let fb = fa.new_compatible();

        a.iter().for_each(|v| fa.add(v));
        b.iter().for_each(|v| fb.add(v));

        let u = fa.union(&fb).unwrap();

        probes
            .iter()
            .chain(&a)
            .chain(&b)
            .all(|v| !(fa.contains(v) || fb.contains(v)) || u.contains(v))
    }
}
