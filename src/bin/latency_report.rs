use hdrhistogram::Histogram;
use matchbook::{MatchingEngine, Side};
use std::time::Instant;

struct OrderInput {
    side: Side,
    price: u32,
    quantity: u32,
    participant_id: u64,
}

fn main() {
    println!("Preparing Latency Report...");

    let trade_count = std::cell::Cell::new(0u64);
    let mut engine = MatchingEngine::new(100_000, |_t| trade_count.set(trade_count.get() + 1));
    engine.warm_up();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3).unwrap();

    const ITERATIONS: u64 = 1_000_000;
    const BUFFER_SIZE: usize = 10_000;

    // Pre-generate order shapes to keep RNG and allocation out of the
    // measured loop. Sides alternate around a common band so the book keeps
    // matching instead of growing without bound.
    println!("Pre-generating {} order shapes...", BUFFER_SIZE);
    let mut inputs = Vec::with_capacity(BUFFER_SIZE);
    for i in 0..BUFFER_SIZE as u64 {
        inputs.push(OrderInput {
            side: if i % 2 == 0 { Side::Buy } else { Side::Sell },
            price: 10_000 + (i % 100) as u32,
            quantity: 10,
            participant_id: 1 + i % 500,
        });
    }

    // Train the branch predictor before measuring.
    println!("Warming up branch predictor ({} ops)...", BUFFER_SIZE);
    let mut order_id = 0u64;
    for input in &inputs {
        order_id += 1;
        engine.add_limit_order(
            input.side,
            input.price,
            input.quantity,
            order_id,
            input.participant_id,
        );
    }

    println!("Running {} iterations...", ITERATIONS);

    let mut total_duration = std::time::Duration::new(0, 0);
    let mut drained_to = 0u64;

    for i in 0..ITERATIONS {
        let input = &inputs[(i % BUFFER_SIZE as u64) as usize];
        order_id += 1;

        let start = Instant::now();
        engine.add_limit_order(
            std::hint::black_box(input.side),
            input.price,
            input.quantity,
            order_id,
            input.participant_id,
        );
        let elapsed = start.elapsed();

        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;

        // Keep live-order head-room; cancels are off the measured path.
        if engine.order_count() > 80_000 {
            for cancel_id in drained_to + 1..=order_id {
                engine.cancel_order(cancel_id);
            }
            drained_to = order_id;
        }
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", ITERATIONS);
    println!(
        "Throughput: {:.2} ops/sec",
        ITERATIONS as f64 / total_duration.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");
    println!("Trades emitted: {}", trade_count.get());
    println!("Resting orders at exit: {}", engine.order_count());

    println!("\nDistribution:");
    for v in histogram.iter_log(100_000, 2.0) {
        let count = v.count_at_value();
        if count > 0 {
            println!(
                "{:6} ns: {:10} count",
                v.value_iterated_to(),
                count
            );
        }
    }
}
