//! Order pool - O(1) slab allocator with cache-line aligned order slots.
//!
//! The pool pre-allocates a contiguous block of order slots at startup,
//! eliminating heap allocation in the hot path. A singly linked free list
//! threaded through the `next` field gives O(1) allocate and deallocate,
//! with LIFO reuse so the next allocation is still warm in cache.

use std::fmt;

use crate::types::Side;

/// Sentinel value representing a null/invalid slot (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Type alias for pool slots - our "compressed pointers".
/// Using u32 instead of 64-bit pointers halves linkage metadata,
/// doubling cache efficiency.
pub type SlotIndex = u32;

/// A unit of resting or incoming liquidity - exactly 64 bytes (one cache line).
///
/// While linked into a price level, `prev`/`next` form the level's intrusive
/// doubly linked FIFO. While in the free list, only `next` is meaningful.
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct Order {
    /// Caller-assigned identifier, unique among live orders
    pub order_id: u64,

    /// Logical owner; used solely for self-match prevention
    pub participant_id: u64,

    /// Admission stamp, monotone across the whole book. The matching loop
    /// never reads it (FIFO comes from list insertion order); retained for
    /// auditing and external reordering.
    pub sequence: u64,

    /// Integer tick price
    pub price: u32,

    /// Remaining quantity; always > 0 while the order is live
    pub quantity: u32,

    /// Which side of the book the order belongs to
    pub side: Side,

    /// Next order at the same price level (or next free slot)
    pub next: SlotIndex,

    /// Previous order at the same price level (enables O(1) cancel)
    pub prev: SlotIndex,
}

// Compile-time assertion: Order must be exactly one cache line
const _: () = assert!(
    std::mem::size_of::<Order>() == 64,
    "Order must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<Order>() == 64,
    "Order must be 64-byte aligned"
);

impl Order {
    /// Create an empty/uninitialized slot (for free-list storage)
    #[inline]
    pub const fn empty() -> Self {
        Self {
            order_id: 0,
            participant_id: 0,
            sequence: 0,
            price: 0,
            quantity: 0,
            side: Side::Buy,
            next: NULL_INDEX,
            prev: NULL_INDEX,
        }
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("order_id", &self.order_id)
            .field("participant_id", &self.participant_id)
            .field("side", &self.side)
            .field("price", &self.price)
            .field("quantity", &self.quantity)
            .field("sequence", &self.sequence)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Pre-allocated order storage with O(1) allocation and deallocation.
///
/// Capacity exhaustion is a programmer error (miscalibrated sizing), not a
/// runtime recoverable condition: `allocate` asserts rather than returning
/// an error. Debug builds additionally carry a per-slot live bitset to catch
/// double-free.
pub struct OrderPool {
    /// Contiguous block of pre-allocated order slots
    slots: Vec<Order>,

    /// Head of the free list (index of first available slot)
    free_head: SlotIndex,

    /// Number of slots currently in the free list
    free_count: u32,

    /// Total capacity
    capacity: u32,

    /// Debug-only double-free detector
    #[cfg(debug_assertions)]
    live: Vec<bool>,
}

impl OrderPool {
    /// Create a new pool with the specified capacity.
    ///
    /// # Panics
    /// Panics if capacity is not below `NULL_INDEX` (MAX is the sentinel).
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "capacity must be less than NULL_INDEX");

        let mut slots = vec![Order::empty(); capacity as usize];

        // Thread the free list through all slots
        for i in 0..capacity.saturating_sub(1) {
            slots[i as usize].next = i + 1;
        }
        if capacity > 0 {
            slots[(capacity - 1) as usize].next = NULL_INDEX;
        }

        Self {
            slots,
            free_head: if capacity > 0 { 0 } else { NULL_INDEX },
            free_count: capacity,
            capacity,
            #[cfg(debug_assertions)]
            live: vec![false; capacity as usize],
        }
    }

    /// Allocate a slot, returned with `prev` and `next` cleared.
    ///
    /// # Panics
    /// Panics when no free slot exists. Size the pool to the maximum number
    /// of concurrently live orders.
    ///
    /// # Complexity
    /// O(1) - pops from head of free list
    #[inline]
    pub fn allocate(&mut self) -> SlotIndex {
        assert!(
            self.free_head != NULL_INDEX,
            "order pool exhausted (capacity {})",
            self.capacity
        );

        let index = self.free_head;
        self.free_head = self.slots[index as usize].next;
        self.free_count -= 1;

        #[cfg(debug_assertions)]
        {
            debug_assert!(!self.live[index as usize]);
            self.live[index as usize] = true;
        }

        let slot = &mut self.slots[index as usize];
        slot.next = NULL_INDEX;
        slot.prev = NULL_INDEX;

        index
    }

    /// Return a slot to the free list.
    ///
    /// # Panics
    /// Panics on the null sentinel or an out-of-range index; debug builds
    /// also panic on a slot that is already free.
    ///
    /// # Complexity
    /// O(1) - pushes to head of free list (LIFO reuse)
    #[inline]
    pub fn deallocate(&mut self, index: SlotIndex) {
        assert!(index != NULL_INDEX, "deallocate of null slot");
        assert!(index < self.capacity, "slot index out of bounds");
        assert!(self.free_count < self.capacity, "deallocate into a full free list");

        #[cfg(debug_assertions)]
        {
            assert!(self.live[index as usize], "double free of pool slot {index}");
            self.live[index as usize] = false;
        }

        let slot = &mut self.slots[index as usize];
        slot.next = self.free_head;
        self.free_head = index;
        self.free_count += 1;
    }

    /// Get an immutable reference to a slot.
    #[inline]
    pub fn get(&self, index: SlotIndex) -> &Order {
        debug_assert!(index < self.capacity, "slot index out of bounds");
        &self.slots[index as usize]
    }

    /// Get a mutable reference to a slot.
    #[inline]
    pub fn get_mut(&mut self, index: SlotIndex) -> &mut Order {
        debug_assert!(index < self.capacity, "slot index out of bounds");
        &mut self.slots[index as usize]
    }

    /// Total capacity of the pool.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots currently free.
    #[inline]
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    /// Number of slots currently allocated.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.capacity - self.free_count
    }

    /// Pre-fault all slab pages (warm-up routine).
    ///
    /// Walks every slot to force the OS to map virtual pages to physical
    /// RAM, preventing page faults in the hot path.
    pub fn warm_up(&mut self) {
        for slot in &mut self.slots {
            // Volatile rewrite to prevent optimization
            let next = slot.next;
            unsafe {
                std::ptr::write_volatile(&mut slot.next, next);
            }
        }
    }
}

impl fmt::Debug for OrderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderPool")
            .field("capacity", &self.capacity)
            .field("free_count", &self.free_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}
