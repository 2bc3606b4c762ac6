//! Determinism test - golden master verification.
//!
//! The engine must produce an identical trade stream and identical final
//! state whenever it replays the same command sequence.

use matchbook::{MatchingEngine, Side, Trade};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

#[derive(Clone, Copy)]
enum Op {
    Add {
        side: Side,
        price: u32,
        quantity: u32,
        order_id: u64,
        participant_id: u64,
    },
    Cancel {
        order_id: u64,
    },
}

/// Generate a deterministic sequence of operations
fn generate_ops(seed: u64, count: usize) -> Vec<Op> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut ops = Vec::with_capacity(count);
    let mut active_orders: Vec<u64> = Vec::new();
    let mut next_order_id = 1u64;

    for _ in 0..count {
        // 70% add, 30% cancel
        if active_orders.is_empty() || rng.gen_bool(0.7) {
            let order_id = next_order_id;
            next_order_id += 1;

            ops.push(Op::Add {
                side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
                price: rng.gen_range(9500..10500),
                quantity: rng.gen_range(1..500),
                order_id,
                participant_id: rng.gen_range(1..100),
            });
            active_orders.push(order_id);
        } else {
            let at = rng.gen_range(0..active_orders.len());
            let order_id = active_orders.swap_remove(at);
            ops.push(Op::Cancel { order_id });
        }
    }

    ops
}

fn hash_trades(trades: &[Trade]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for t in trades {
        t.buy_order_id.hash(&mut hasher);
        t.sell_order_id.hash(&mut hasher);
        t.price.hash(&mut hasher);
        t.quantity.hash(&mut hasher);
    }
    hasher.finish()
}

/// Run the engine over a sequence; returns (trade stream hash, state hash)
fn run_engine(ops: &[Op]) -> (u64, u64) {
    let trades = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&trades);
    let mut engine = MatchingEngine::new(100_000, move |t| sink.borrow_mut().push(t));

    for op in ops {
        match *op {
            Op::Add {
                side,
                price,
                quantity,
                order_id,
                participant_id,
            } => engine.add_limit_order(side, price, quantity, order_id, participant_id),
            Op::Cancel { order_id } => engine.cancel_order(order_id),
        }
    }

    engine.check_consistency();
    let trade_hash = hash_trades(&trades.borrow());
    (trade_hash, engine.state_hash())
}

#[test]
fn determinism_small() {
    const SEED: u64 = 0xDEADBEEF;
    const COUNT: usize = 1_000;
    const RUNS: usize = 10;

    let ops = generate_ops(SEED, COUNT);
    let (first_trades, first_state) = run_engine(&ops);

    for run in 1..RUNS {
        let (trade_hash, state_hash) = run_engine(&ops);
        assert_eq!(trade_hash, first_trades, "trade hash mismatch on run {run}");
        assert_eq!(state_hash, first_state, "state hash mismatch on run {run}");
    }
}

#[test]
fn determinism_large() {
    const SEED: u64 = 0xCAFEBABE;
    const COUNT: usize = 100_000;
    const RUNS: usize = 3;

    let ops = generate_ops(SEED, COUNT);
    let (first_trades, first_state) = run_engine(&ops);

    for run in 1..RUNS {
        let (trade_hash, state_hash) = run_engine(&ops);
        assert_eq!(trade_hash, first_trades, "trade hash mismatch on run {run}");
        assert_eq!(state_hash, first_state, "state hash mismatch on run {run}");
    }
}

#[test]
fn different_seeds_differ() {
    let ops1 = generate_ops(1, 1_000);
    let ops2 = generate_ops(2, 1_000);

    let (trades1, _) = run_engine(&ops1);
    let (trades2, _) = run_engine(&ops2);

    assert_ne!(trades1, trades2, "different seeds should diverge");
}
