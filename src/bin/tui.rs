use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use matchbook::{MatchingEngine, Side};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::{io, time::Duration};

/// Top-of-book snapshot shared with the UI thread
#[derive(Default, Clone)]
struct BookSnapshot {
    bids: Vec<(u32, u64)>, // (price, total quantity)
    asks: Vec<(u32, u64)>,
}

struct SharedStats {
    ops_count: AtomicU64,
    trade_count: AtomicU64,
    avg_latency_ns: AtomicU64,
    pool_used: AtomicU64,
    pool_capacity: AtomicU64,
    book_snapshot: RwLock<BookSnapshot>,
}

impl SharedStats {
    fn new(capacity: u64) -> Self {
        Self {
            ops_count: AtomicU64::new(0),
            trade_count: AtomicU64::new(0),
            avg_latency_ns: AtomicU64::new(0),
            pool_used: AtomicU64::new(0),
            pool_capacity: AtomicU64::new(capacity),
            book_snapshot: RwLock::new(BookSnapshot::default()),
        }
    }
}

fn render_level_bars(levels: &[(u32, u64)]) -> String {
    let mut out = String::new();
    let max_qty = levels.iter().map(|(_, q)| *q).max().unwrap_or(1) as f32;

    for (price, qty) in levels.iter().take(15) {
        let bar_len = ((*qty as f32 / max_qty) * 20.0) as usize;
        let bar = "█".repeat(bar_len);
        out.push_str(&format!("{:>8} {} {:<6}\n", price, bar, qty));
    }
    out
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let capacity: u32 = 1_000_000;
    let stats = Arc::new(SharedStats::new(u64::from(capacity)));
    let stats_clone = stats.clone();

    // Engine thread: synthetic random-walk flow against a live book.
    thread::spawn(move || {
        let trade_stats = Arc::clone(&stats_clone);
        let on_trade = move |_t| {
            trade_stats.trade_count.fetch_add(1, Ordering::Relaxed);
        };
        let mut engine = MatchingEngine::new(capacity, on_trade);
        engine.warm_up();

        let mut order_id = 1u64;
        let mut rng = 12345u64; // simple LCG, fast enough for flow generation
        let mut loop_count = 0u64;
        let mut mid_price: u32 = 300_000;
        let mut drained_to = 0u64;

        loop {
            const BATCH_SIZE: u64 = 1000;
            let start_batch = std::time::Instant::now();

            for _ in 0..BATCH_SIZE {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
                order_id = order_id.wrapping_add(1);

                // High 32 bits of the LCG carry the randomness
                let r = rng >> 32;

                // Occasional drift so the book wanders like a real mid
                if r % 100 == 0 {
                    let drift = (r % 11) as i64 - 5;
                    mid_price = (i64::from(mid_price) + drift).max(1000) as u32;
                }

                let side = if r % 2 == 0 { Side::Buy } else { Side::Sell };

                let spread_offset = (100 + (r % 400)) as u32 / 2;
                let noise = (r % 20) as i64 - 10;
                let base_price = match side {
                    Side::Buy => mid_price.saturating_sub(spread_offset),
                    Side::Sell => mid_price.saturating_add(spread_offset),
                };
                let price = (i64::from(base_price) + noise).max(1) as u32;
                let quantity = 1 + (rng % 100) as u32;
                let participant_id = 1 + r % 32;

                engine.add_limit_order(side, price, quantity, order_id, participant_id);
            }

            loop_count += 1;

            stats_clone.ops_count.fetch_add(BATCH_SIZE, Ordering::Relaxed);

            let elapsed = start_batch.elapsed();
            let ns_per_op = elapsed.as_nanos() as u64 / BATCH_SIZE;
            stats_clone.avg_latency_ns.store(ns_per_op, Ordering::Relaxed);
            stats_clone
                .pool_used
                .store(engine.order_count() as u64, Ordering::Relaxed);

            if loop_count % 50 == 0 {
                if let Ok(mut snapshot) = stats_clone.book_snapshot.write() {
                    snapshot.bids = engine
                        .levels(Side::Buy)
                        .take(15)
                        .map(|pl| (pl.price, pl.total_quantity))
                        .collect();
                    snapshot.asks = engine
                        .levels(Side::Sell)
                        .take(15)
                        .map(|pl| (pl.price, pl.total_quantity))
                        .collect();
                }
            }

            // Trim stale depth before the pool fills up
            if engine.order_count() > (capacity as usize) / 2 {
                let horizon = order_id.saturating_sub(u64::from(capacity) / 4);
                for stale in drained_to + 1..horizon {
                    engine.cancel_order(stale);
                }
                drained_to = horizon.saturating_sub(1);
            }
        }
    });

    let mut last_ops = 0;
    let mut last_time = std::time::Instant::now();
    let mut throughput = 0.0;

    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }

        let now = std::time::Instant::now();
        if now.duration_since(last_time).as_secs_f64() >= 1.0 {
            let current_ops = stats.ops_count.load(Ordering::Relaxed);
            throughput = (current_ops - last_ops) as f64;
            last_ops = current_ops;
            last_time = now;
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints(
                    [
                        Constraint::Length(3),  // header
                        Constraint::Min(10),    // book
                        Constraint::Length(10), // stats
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Block::default()
                .borders(Borders::ALL)
                .title("MATCHBOOK Synthetic Flow");
            let title = Paragraph::new("Press 'q' to quit")
                .block(header)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Cyan));
            f.render_widget(title, chunks[0]);

            let book_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(chunks[1]);

            let snapshot = stats.book_snapshot.read().unwrap();
            let bids_text = render_level_bars(&snapshot.bids);
            let asks_text = render_level_bars(&snapshot.asks);

            let bids_widget = Paragraph::new(bids_text).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("BIDS")
                    .style(Style::default().fg(Color::Green)),
            );
            let asks_widget = Paragraph::new(asks_text).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("ASKS")
                    .style(Style::default().fg(Color::Red)),
            );

            f.render_widget(bids_widget, book_chunks[0]);
            f.render_widget(asks_widget, book_chunks[1]);

            let ops_fmt = if throughput > 1_000_000.0 {
                format!("{:.2} M", throughput / 1_000_000.0)
            } else {
                format!("{:.0} k", throughput / 1_000.0)
            };

            let pool_used = stats.pool_used.load(Ordering::Relaxed);
            let pool_cap = stats.pool_capacity.load(Ordering::Relaxed);
            let pool_pct = (pool_used as f64 / pool_cap as f64) * 100.0;
            let latency = stats.avg_latency_ns.load(Ordering::Relaxed);
            let trade_count = stats.trade_count.load(Ordering::Relaxed);

            let stats_text = format!(
                "Throughput: {} ops/sec\nLatency (batch avg): {} ns\nTrades: {}\nPool Usage: {} / {} ({:.1}%)",
                ops_fmt, latency, trade_count, pool_used, pool_cap, pool_pct
            );

            let stats_block = Paragraph::new(stats_text)
                .block(Block::default().borders(Borders::ALL).title("Engine Telemetry"))
                .style(Style::default().fg(Color::Yellow));
            f.render_widget(stats_block, chunks[2]);
        })?;
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    Ok(())
}
