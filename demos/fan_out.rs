//! # Example: fan_out
//!
//! Runs the same group of operations with both aggregation modes.
//!
//! ## Flow
//! ```text
//! all([a, b, c])        ──► waits for everyone ──► Aggregate{ b, c }
//! fail_fast([a, b, c])  ──► first failure (b)  ──► FailFast{ b } (a and c cancelled)
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example fan_out
//! ```

use std::time::Duration;

use retryvisor::{Context, OpError, OpFn, OpRef, Operation, Opt, all, fail_fast, timeout, wrap};

fn op(name: &'static str, ms: u64, fail: bool) -> OpRef {
    OpFn::arc(name, move |ctx: Context| async move {
        ctx.sleep(Duration::from_millis(ms)).await?;
        if fail {
            return Err(OpError::msg(format!("{name} gave up after {ms}ms")));
        }
        println!("[{name}] done");
        Ok(())
    })
}

fn group() -> Vec<OpRef> {
    vec![
        op("a", 300, false),
        op("b", 100, true),
        // Its own deadline (150ms) is shorter than its work (400ms).
        timeout(op("c", 400, false), Duration::from_millis(150)),
        // A panic inside a fanned-out operation becomes a Crash entry.
        OpFn::arc("d", |_ctx: Context| async {
            if std::env::var_os("FAN_OUT_PANIC").is_some() {
                panic!("d exploded");
            }
            Ok(())
        }) as OpRef,
    ]
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    match all(group()).run_all(Context::background()).await {
        Err(OpError::Aggregate(agg)) => {
            println!("[all] {} failed:", agg.len());
            for failure in agg.iter() {
                println!(
                    "  #{} {} → {} (deadline={})",
                    failure.index(),
                    failure.op().name(),
                    failure.error(),
                    failure.error().is_deadline_exceeded()
                );
            }
        }
        other => println!("[all] {other:?}"),
    }

    match fail_fast(group()).run_all(Context::background()).await {
        Err(OpError::FailFast(ff)) => {
            println!("[fail_fast] first: {} → {}", ff.op().name(), ff.error());
        }
        other => println!("[fail_fast] {other:?}"),
    }

    // Fan-outs are operations too: retry the whole group twice.
    let retried = wrap(
        std::sync::Arc::new(all(group()).with_name("group")),
        [Opt::retry(2, Duration::from_millis(500))],
    );
    let err = retried.run(Context::background()).await.expect_err("b always fails");
    println!("[retry(all)] {err}");
    Ok(())
}
