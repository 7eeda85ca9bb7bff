//! # Example: retry_flaky
//!
//! Demonstrates how a wrapped operation is retried on a fixed period until it
//! succeeds, and how a slow attempt is cut off by the per-attempt deadline.
//!
//! ## Flow
//! ```text
//! Retry::run()
//!   ├─► attempt 1 → Err("boom #1")          → sleep(period - elapsed)
//!   ├─► attempt 2 → sleeps past the period  → Timeout, no extra sleep
//!   └─► attempt 3 → Ok(())                  → done
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_flaky
//! ```

use std::{
    sync::Arc,
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use retryvisor::{Attempts, Context, OpError, OpFn, OpRef, Operation, Opt, wrap};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    // 1. An operation that fails once, then hangs once, then succeeds.
    let flaky: OpRef = OpFn::arc("flaky", move |ctx: Context| {
        let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
        async move {
            println!("[flaky] attempt {attempt}");
            match attempt {
                1 => Err(OpError::msg(format!("boom #{attempt}"))),
                2 => {
                    ctx.sleep(Duration::from_secs(5)).await?;
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    });

    // 2. Up to 5 attempts, 300ms each, passes started 300ms apart.
    let op = wrap(flaky, [Opt::retry(5, Duration::from_millis(300))]);

    let started = Instant::now();
    op.run(Context::background()).await?;
    println!(
        "[main] succeeded after {} attempts in {:?}",
        calls.load(Ordering::Relaxed),
        started.elapsed()
    );

    // 3. Repeat mode: run a heartbeat exactly 3 times regardless of outcome.
    let beat: OpRef = OpFn::arc("heartbeat", |_ctx: Context| async {
        println!("[heartbeat] tick");
        Ok(())
    });
    wrap(beat, [Opt::repeat(3, Duration::from_millis(100))])
        .run(Context::background())
        .await?;

    // 4. Forever with an outer deadline: the parent decides when to stop.
    let never: OpRef = OpFn::arc("never", |_ctx: Context| async {
        Err(OpError::msg("still down"))
    });
    let parent = Context::background().with_timeout(Duration::from_millis(350));
    let err = wrap(never, [Opt::retry(Attempts::FOREVER, Duration::from_millis(100))])
        .run(parent)
        .await
        .expect_err("parent deadline ends the loop");
    println!("[main] forever loop stopped: {err} (label={})", err.as_label());

    Ok(())
}
