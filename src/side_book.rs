//! Side book - sorted dense storage of price levels for one side.
//!
//! Bids are kept ascending and asks descending, so the best price of either
//! side sits at the back of the vector: best access and top-of-book pop are
//! O(1), and a crossing order's residual almost always lands there too.
//! Typical books hold O(10^2) active levels, where cache-friendly binary
//! search over a dense vector beats pointer-chasing a tree. The backing
//! storage is reserved once; growing past the reservation would invalidate
//! level references held across a matching loop and is treated as a fatal
//! sizing error.

use crate::price_level::PriceLevel;
use crate::types::Side;

/// Default ceiling on distinct price levels per side
pub const DEFAULT_MAX_PRICE_LEVELS: usize = 4096;

/// One side of the book: a strictly sorted sequence of non-empty levels.
#[derive(Debug)]
pub struct SideBook {
    side: Side,
    levels: Vec<PriceLevel>,
}

impl SideBook {
    /// Create an empty side with a fixed level ceiling.
    pub fn with_capacity(side: Side, max_levels: usize) -> Self {
        Self {
            side,
            levels: Vec::with_capacity(max_levels),
        }
    }

    /// Which side this book holds.
    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Position `price` occupies (or would occupy) in the side's sort order:
    /// bids ascend, asks descend, best at the back either way.
    #[inline]
    fn insertion_point(&self, price: u32) -> usize {
        match self.side {
            Side::Buy => self.levels.partition_point(|pl| pl.price < price),
            Side::Sell => self.levels.partition_point(|pl| pl.price > price),
        }
    }

    /// Binary-search for an existing level at `price`.
    #[inline]
    pub fn find(&self, price: u32) -> Option<usize> {
        let at = self.insertion_point(price);
        (at < self.levels.len() && self.levels[at].price == price).then_some(at)
    }

    /// Return the level at `price`, inserting a fresh empty one if absent.
    ///
    /// # Panics
    /// Panics if inserting a new level would grow past the reserved ceiling
    /// (the insertion would reallocate and invalidate held references).
    pub fn find_or_create(&mut self, price: u32) -> &mut PriceLevel {
        let at = self.insertion_point(price);
        if at == self.levels.len() || self.levels[at].price != price {
            assert!(
                self.levels.len() < self.levels.capacity(),
                "side book level ceiling exceeded ({})",
                self.levels.capacity()
            );
            self.levels.insert(at, PriceLevel::new(price));
        }
        &mut self.levels[at]
    }

    /// Best level of this side (highest bid / lowest ask), or `None`.
    #[inline]
    pub fn best(&self) -> Option<&PriceLevel> {
        self.levels.last()
    }

    /// Mutable access to the best level.
    #[inline]
    pub fn best_mut(&mut self) -> Option<&mut PriceLevel> {
        self.levels.last_mut()
    }

    /// Drop the best level.
    ///
    /// # Complexity
    /// O(1) - removal from the back
    #[inline]
    pub fn pop_best(&mut self) {
        self.levels.pop();
    }

    /// Drop the level at `at` (interior removals shift the tail).
    #[inline]
    pub fn remove_at(&mut self, at: usize) {
        self.levels.remove(at);
    }

    /// Level at a storage position.
    #[inline]
    pub fn level(&self, at: usize) -> &PriceLevel {
        &self.levels[at]
    }

    /// Mutable level at a storage position.
    #[inline]
    pub fn level_mut(&mut self, at: usize) -> &mut PriceLevel {
        &mut self.levels[at]
    }

    /// Number of active levels.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when the side holds no levels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels in storage order (worst to best).
    #[inline]
    pub fn as_slice(&self) -> &[PriceLevel] {
        &self.levels
    }

    /// Iterate levels best-first.
    #[inline]
    pub fn iter_best_first(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.iter().rev()
    }
}
