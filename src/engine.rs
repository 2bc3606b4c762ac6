//! Matching engine - the price-time priority core.
//!
//! Owns the order pool, both side books, and the id lookup, and implements
//! the cross/rest algorithm:
//! 1. CROSSING: match an aggressive order against the opposite side,
//!    best level first, FIFO within a level
//! 2. RESTING: park any residual quantity in the order's own side
//!
//! Trades are delivered synchronously through a caller-provided callback
//! (static dispatch); the callback must not re-enter the engine.

use rustc_hash::FxHashMap;

use crate::pool::{OrderPool, SlotIndex, NULL_INDEX};
use crate::price_level::PriceLevel;
use crate::side_book::{SideBook, DEFAULT_MAX_PRICE_LEVELS};
use crate::types::{Side, Trade};

/// Single-symbol limit order book with strict price-time priority and
/// self-match prevention (cancel-incoming policy).
///
/// Single-threaded by design: every operation runs to completion on the
/// caller's thread, and references returned by [`best_bid`](Self::best_bid) /
/// [`best_ask`](Self::best_ask) stay valid only until the next mutating call.
pub struct MatchingEngine<F: FnMut(Trade)> {
    /// Slab storage for every live order
    pool: OrderPool,
    /// Bid levels, ascending, best (highest) at the back
    bids: SideBook,
    /// Ask levels, descending, best (lowest) at the back
    asks: SideBook,
    /// order_id -> pool slot, for O(1) cancel; pre-reserved, never rehashes
    /// in steady state
    order_index: FxHashMap<u64, SlotIndex>,
    /// Monotonic admission counter stamped onto every accepted order
    sequence: u64,
    /// Trade sink, invoked once per fill in fill order
    on_trade: F,
}

impl<F: FnMut(Trade)> MatchingEngine<F> {
    /// Create an engine sized for `capacity` concurrently live orders, with
    /// the default per-side level ceiling.
    pub fn new(capacity: u32, on_trade: F) -> Self {
        Self::with_max_levels(capacity, DEFAULT_MAX_PRICE_LEVELS, on_trade)
    }

    /// Create an engine with an explicit per-side price-level ceiling.
    pub fn with_max_levels(capacity: u32, max_levels: usize, on_trade: F) -> Self {
        Self {
            pool: OrderPool::new(capacity),
            bids: SideBook::with_capacity(Side::Buy, max_levels),
            asks: SideBook::with_capacity(Side::Sell, max_levels),
            order_index: FxHashMap::with_capacity_and_hasher(
                capacity as usize,
                Default::default(),
            ),
            sequence: 0,
            on_trade,
        }
    }

    /// Admit a limit order.
    ///
    /// The order first matches against the opposite side while it crosses;
    /// any residual quantity rests in its own side's price level. A fully
    /// filled (or self-match-voided) order never touches the index.
    ///
    /// `order_id` must not collide with a currently live order; the engine
    /// does not check in release builds, and a duplicate leaves the index
    /// pointing at only one of the two.
    pub fn add_limit_order(
        &mut self,
        side: Side,
        price: u32,
        quantity: u32,
        order_id: u64,
        participant_id: u64,
    ) {
        debug_assert!(quantity > 0, "zero-quantity order");
        debug_assert!(price > 0, "zero-price order");

        let incoming = self.pool.allocate();
        {
            let order = self.pool.get_mut(incoming);
            order.order_id = order_id;
            order.participant_id = participant_id;
            order.price = price;
            order.quantity = quantity;
            order.sequence = self.sequence;
            order.side = side;
        }
        self.sequence += 1;

        let crossing = match side {
            Side::Buy => self.asks.best().is_some_and(|pl| price >= pl.price),
            Side::Sell => self.bids.best().is_some_and(|pl| price <= pl.price),
        };
        if crossing {
            self.execute_match(incoming);
        }

        if self.pool.get(incoming).quantity > 0 {
            let own = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            own.find_or_create(price).push_back(&mut self.pool, incoming);
            debug_assert!(
                !self.order_index.contains_key(&order_id),
                "duplicate live order id {order_id}"
            );
            self.order_index.insert(order_id, incoming);
        } else {
            // Fully filled or voided by self-match prevention; never indexed.
            self.pool.deallocate(incoming);
        }
    }

    /// Cancel a resting order by id.
    ///
    /// Unknown or already-cancelled ids are a silent no-op, making cancel
    /// idempotent.
    pub fn cancel_order(&mut self, order_id: u64) {
        let Some(&slot) = self.order_index.get(&order_id) else {
            return;
        };

        let (side, price) = {
            let order = self.pool.get(slot);
            debug_assert!(order.quantity > 0);
            (order.side, order.price)
        };

        let book = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let at = book
            .find(price)
            .expect("order in index but price level missing");

        let now_empty = book.level_mut(at).remove(&mut self.pool, slot);
        if now_empty {
            book.remove_at(at);
        }

        self.order_index.remove(&order_id);
        self.pool.deallocate(slot);
    }

    /// Best (highest) bid level, or `None`. Valid until the next mutation.
    #[inline]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.best()
    }

    /// Best (lowest) ask level, or `None`. Valid until the next mutation.
    #[inline]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.best()
    }

    /// Drive the matching loop for a crossing incoming order.
    ///
    /// Allocation-free: level references are recomputed from the back of the
    /// opposite side on each step instead of cached across mutations, and
    /// the pre-reserved index map absorbs the erase of filled orders.
    fn execute_match(&mut self, incoming: SlotIndex) {
        let (side, incoming_price, incoming_id, incoming_participant) = {
            let order = self.pool.get(incoming);
            (order.side, order.price, order.order_id, order.participant_id)
        };

        loop {
            if self.pool.get(incoming).quantity == 0 {
                break;
            }

            let opposite = match side {
                Side::Buy => &self.asks,
                Side::Sell => &self.bids,
            };
            let Some(best) = opposite.best() else {
                break;
            };
            let crosses = match side {
                Side::Buy => incoming_price >= best.price,
                Side::Sell => incoming_price <= best.price,
            };
            if !crosses {
                break;
            }
            let level_price = best.price;
            let resting = best.front();
            debug_assert!(resting != NULL_INDEX);

            let (resting_id, resting_participant, resting_quantity) = {
                let order = self.pool.get(resting);
                (order.order_id, order.participant_id, order.quantity)
            };

            if resting_participant == incoming_participant {
                // Self-match prevention, cancel-incoming: void the whole
                // incoming order and leave the book untouched. Fills already
                // made against other participants stand.
                self.pool.get_mut(incoming).quantity = 0;
                break;
            }

            let fill_quantity = self.pool.get(incoming).quantity.min(resting_quantity);

            self.pool.get_mut(incoming).quantity -= fill_quantity;
            self.pool.get_mut(resting).quantity -= fill_quantity;
            let level = match side {
                Side::Buy => self.asks.best_mut(),
                Side::Sell => self.bids.best_mut(),
            }
            .expect("crossed level disappeared mid-match");
            level.subtract_quantity(fill_quantity);

            let trade = match side {
                Side::Buy => Trade {
                    buy_order_id: incoming_id,
                    sell_order_id: resting_id,
                    price: level_price,
                    quantity: fill_quantity,
                },
                Side::Sell => Trade {
                    buy_order_id: resting_id,
                    sell_order_id: incoming_id,
                    price: level_price,
                    quantity: fill_quantity,
                },
            };
            (self.on_trade)(trade);

            if resting_quantity == fill_quantity {
                // Resting order exhausted: unlink (its quantity is already
                // zero, so the removal subtracts nothing), drop the level if
                // that emptied it, and recycle the slot.
                let opposite = match side {
                    Side::Buy => &mut self.asks,
                    Side::Sell => &mut self.bids,
                };
                let now_empty = opposite
                    .best_mut()
                    .expect("crossed level disappeared mid-match")
                    .remove(&mut self.pool, resting);
                if now_empty {
                    opposite.pop_best();
                }
                self.order_index.remove(&resting_id);
                self.pool.deallocate(resting);
            }
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of orders currently resting in the book.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.order_index.len()
    }

    /// Maximum number of concurrently live orders.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.pool.capacity()
    }

    /// Free pool slots remaining.
    #[inline]
    pub fn free_count(&self) -> u32 {
        self.pool.free_count()
    }

    /// Spread in ticks (best ask minus best bid), when both sides are
    /// present and not crossed.
    pub fn spread(&self) -> Option<u32> {
        match (self.bids.best(), self.asks.best()) {
            (Some(bid), Some(ask)) if ask.price > bid.price => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Depth at an exact price: `(total_quantity, order_count)`.
    pub fn depth_at(&self, side: Side, price: u32) -> (u64, u32) {
        let book = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        book.find(price)
            .map(|at| {
                let pl = book.level(at);
                (pl.total_quantity, pl.count)
            })
            .unwrap_or((0, 0))
    }

    /// Iterate one side's levels best-first.
    pub fn levels(&self, side: Side) -> impl Iterator<Item = &PriceLevel> {
        match side {
            Side::Buy => self.bids.iter_best_first(),
            Side::Sell => self.asks.iter_best_first(),
        }
    }

    /// Pre-fault the pool pages (call once after construction).
    pub fn warm_up(&mut self) {
        self.pool.warm_up();
    }

    /// Hash of the externally observable state, for determinism testing.
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.bids
            .best()
            .map(|pl| (pl.price, pl.total_quantity))
            .hash(&mut hasher);
        self.asks
            .best()
            .map(|pl| (pl.price, pl.total_quantity))
            .hash(&mut hasher);
        self.order_index.len().hash(&mut hasher);
        self.pool.free_count().hash(&mut hasher);
        hasher.finish()
    }

    /// Walk the entire book and assert every structural invariant: strict
    /// per-side sort order, no empty levels, intact list linkage, level
    /// totals equal to the sum of member quantities, index/book agreement,
    /// and slot conservation. Intended for tests and debugging sweeps.
    pub fn check_consistency(&self) {
        let mut linked_orders = 0usize;

        for book in [&self.bids, &self.asks] {
            let levels = book.as_slice();
            for pair in levels.windows(2) {
                match book.side() {
                    Side::Buy => assert!(
                        pair[0].price < pair[1].price,
                        "bid levels not strictly ascending"
                    ),
                    Side::Sell => assert!(
                        pair[0].price > pair[1].price,
                        "ask levels not strictly descending"
                    ),
                }
            }

            for pl in levels {
                assert!(!pl.is_empty(), "empty level left in book");

                let mut sum = 0u64;
                let mut count = 0u32;
                let mut prev = NULL_INDEX;
                let mut at = pl.head;
                while at != NULL_INDEX {
                    let order = self.pool.get(at);
                    assert!(order.quantity > 0, "zero-quantity order linked in book");
                    assert_eq!(order.price, pl.price, "order price disagrees with level");
                    assert_eq!(order.side, book.side(), "order linked on wrong side");
                    assert_eq!(order.prev, prev, "broken prev linkage");
                    assert_eq!(
                        self.order_index.get(&order.order_id),
                        Some(&at),
                        "linked order missing from index"
                    );
                    sum += u64::from(order.quantity);
                    count += 1;
                    prev = at;
                    at = order.next;
                }
                assert_eq!(pl.tail, prev, "tail does not terminate the list");
                assert_eq!(pl.total_quantity, sum, "level total out of sync");
                assert_eq!(pl.count, count, "level count out of sync");
                linked_orders += count as usize;
            }
        }

        assert_eq!(
            linked_orders,
            self.order_index.len(),
            "index size disagrees with linked orders"
        );
        assert_eq!(
            self.pool.free_count() as usize + self.order_index.len(),
            self.pool.capacity() as usize,
            "pool slots leaked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Sink = Rc<RefCell<Vec<Trade>>>;

    fn capture_engine(capacity: u32) -> (MatchingEngine<impl FnMut(Trade)>, Sink) {
        let trades: Sink = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&trades);
        let engine = MatchingEngine::new(capacity, move |t| sink.borrow_mut().push(t));
        (engine, trades)
    }

    #[test]
    fn test_buy_rests_when_no_asks() {
        let (mut engine, trades) = capture_engine(20);

        engine.add_limit_order(Side::Buy, 100, 50, 1, 100);

        assert!(trades.borrow().is_empty());
        let bid = engine.best_bid().unwrap();
        assert_eq!(bid.price, 100);
        assert_eq!(bid.total_quantity, 50);
        assert!(engine.best_ask().is_none());
        engine.check_consistency();
    }

    #[test]
    fn test_exact_fill_empties_both_sides() {
        let (mut engine, trades) = capture_engine(20);

        engine.add_limit_order(Side::Sell, 100, 50, 1, 100);
        engine.add_limit_order(Side::Buy, 100, 50, 2, 200);

        let trades = trades.borrow();
        assert_eq!(
            *trades,
            vec![Trade {
                buy_order_id: 2,
                sell_order_id: 1,
                price: 100,
                quantity: 50
            }]
        );
        assert!(engine.best_bid().is_none());
        assert!(engine.best_ask().is_none());
        assert_eq!(engine.order_count(), 0);
        engine.check_consistency();
    }

    #[test]
    fn test_partial_fill_residual_rests() {
        let (mut engine, trades) = capture_engine(20);

        engine.add_limit_order(Side::Sell, 100, 30, 1, 100);
        engine.add_limit_order(Side::Buy, 100, 50, 2, 200);

        assert_eq!(trades.borrow().len(), 1);
        assert_eq!(trades.borrow()[0].quantity, 30);
        assert!(engine.best_ask().is_none());
        let bid = engine.best_bid().unwrap();
        assert_eq!(bid.price, 100);
        assert_eq!(bid.total_quantity, 20);
        engine.check_consistency();
    }

    #[test]
    fn test_trade_price_is_resting_price() {
        let (mut engine, trades) = capture_engine(20);

        engine.add_limit_order(Side::Sell, 100, 20, 1, 100);
        // Aggressive buy at 105 still trades at the resting 100.
        engine.add_limit_order(Side::Buy, 105, 20, 2, 200);

        assert_eq!(trades.borrow()[0].price, 100);
        engine.check_consistency();
    }

    #[test]
    fn test_fifo_within_level() {
        let (mut engine, trades) = capture_engine(20);

        engine.add_limit_order(Side::Sell, 100, 10, 1, 100);
        engine.add_limit_order(Side::Sell, 100, 10, 2, 101);
        engine.add_limit_order(Side::Buy, 100, 15, 3, 200);

        let trades = trades.borrow();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].sell_order_id, 1);
        assert_eq!(trades[1].sell_order_id, 2);
        assert_eq!(trades[1].quantity, 5);
    }

    #[test]
    fn test_smp_voids_incoming() {
        let (mut engine, trades) = capture_engine(20);

        engine.add_limit_order(Side::Sell, 100, 50, 1, 100);
        engine.add_limit_order(Side::Buy, 100, 50, 2, 100);

        assert!(trades.borrow().is_empty());
        assert_eq!(engine.best_ask().unwrap().total_quantity, 50);
        assert!(engine.best_bid().is_none());
        engine.check_consistency();
    }

    #[test]
    fn test_cancel_removes_order_and_level() {
        let (mut engine, _trades) = capture_engine(20);

        engine.add_limit_order(Side::Buy, 100, 50, 1, 100);
        engine.cancel_order(1);

        assert!(engine.best_bid().is_none());
        assert_eq!(engine.order_count(), 0);
        assert_eq!(engine.free_count(), engine.capacity());
        engine.check_consistency();
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let (mut engine, _trades) = capture_engine(20);
        engine.cancel_order(999);
        engine.check_consistency();
    }

    #[test]
    fn test_spread_and_depth() {
        let (mut engine, _trades) = capture_engine(20);

        engine.add_limit_order(Side::Buy, 99, 10, 1, 100);
        engine.add_limit_order(Side::Buy, 99, 15, 2, 101);
        engine.add_limit_order(Side::Sell, 101, 20, 3, 102);

        assert_eq!(engine.spread(), Some(2));
        assert_eq!(engine.depth_at(Side::Buy, 99), (25, 2));
        assert_eq!(engine.depth_at(Side::Sell, 101), (20, 1));
        assert_eq!(engine.depth_at(Side::Sell, 100), (0, 0));
    }

    #[test]
    fn test_levels_iterate_best_first() {
        let (mut engine, _trades) = capture_engine(20);

        engine.add_limit_order(Side::Buy, 100, 10, 1, 100);
        engine.add_limit_order(Side::Buy, 102, 10, 2, 100);
        engine.add_limit_order(Side::Buy, 101, 10, 3, 100);

        let best_first: Vec<u32> = engine.levels(Side::Buy).map(|pl| pl.price).collect();
        assert_eq!(best_first, vec![102, 101, 100]);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let (mut engine, _trades) = capture_engine(20);

        engine.add_limit_order(Side::Buy, 100, 10, 1, 100);
        engine.add_limit_order(Side::Buy, 101, 10, 2, 100);

        let first = engine.order_index.get(&1).copied().unwrap();
        let second = engine.order_index.get(&2).copied().unwrap();
        assert!(engine.pool.get(first).sequence < engine.pool.get(second).sequence);
    }

    #[test]
    fn test_state_hash_tracks_book_state() {
        let (mut a, _) = capture_engine(20);
        let (mut b, _) = capture_engine(20);

        a.add_limit_order(Side::Buy, 100, 10, 1, 100);
        b.add_limit_order(Side::Buy, 100, 10, 1, 100);
        assert_eq!(a.state_hash(), b.state_hash());

        b.add_limit_order(Side::Sell, 105, 10, 2, 101);
        assert_ne!(a.state_hash(), b.state_hash());
    }
}
