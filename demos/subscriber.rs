//! # Example: subscriber
//!
//! Wires a [`Bus`] into a [`SubscriberSet`] with the built-in `LogWriter` and a
//! custom metrics subscriber, then runs a flaky wrapped operation and a fan-out.
//!
//! ## Flow
//! ```text
//! Retry / Multi ── publish ──► Bus ──► SubscriberSet::forward_from
//!                                         ├─► LogWriter.on_event()
//!                                         └─► Metrics.on_event()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example subscriber --features logging
//! ```

use std::{
    sync::Arc,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
    time::Duration,
};

use retryvisor::{
    Bus, Context, Event, EventKind, LogWriter, OpError, OpFn, OpRef, Opt, Subscribe,
    SubscriberSet, all, wrap,
};

#[derive(Default)]
struct Metrics {
    attempts: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
}

impl Metrics {
    fn print_stats(&self) {
        println!();
        println!("Metrics:");
        println!(" ├─► Attempts: {}", self.attempts.load(Ordering::Relaxed));
        println!(" ├─► Failures: {}", self.failures.load(Ordering::Relaxed));
        println!(" └─► Retries:  {}", self.retries.load(Ordering::Relaxed));
    }
}

#[async_trait::async_trait]
impl Subscribe for Metrics {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::AttemptStarting => {
                self.attempts.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::AttemptFailed | EventKind::TimeoutHit | EventKind::CrashCaptured => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::RetryScheduled => {
                self.retries.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let bus = Bus::new(256);
    let metrics = Arc::new(Metrics::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![
        Arc::new(LogWriter::new()) as Arc<dyn Subscribe>,
        Arc::clone(&metrics) as Arc<dyn Subscribe>,
    ];
    let set = SubscriberSet::new(subs, bus.clone());
    set.forward_from(&bus);

    let counter = Arc::new(AtomicU32::new(0));
    let flaky: OpRef = OpFn::arc("flaky", move |_ctx: Context| {
        let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
        async move {
            if attempt <= 2 {
                return Err(OpError::msg(format!("attempt {attempt} failed")));
            }
            Ok(())
        }
    });
    let steady: OpRef = OpFn::arc("steady", |ctx: Context| async move {
        ctx.sleep(Duration::from_millis(20)).await?;
        Ok(())
    });

    let wrapped = wrap(
        flaky,
        [
            Opt::retry(4, Duration::from_millis(50)),
            Opt::recover_panic(true),
            Opt::publish(bus.clone()),
        ],
    );
    all([wrapped, steady])
        .with_bus(bus.clone())
        .run_all(Context::background())
        .await?;

    set.shutdown().await;
    metrics.print_stats();
    Ok(())
}
