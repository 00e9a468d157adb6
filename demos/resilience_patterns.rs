//! Resilience Patterns Demo
//!
//! Walks a simulated market-data upstream through throttling, an outage and
//! recovery, showing which fallback answers at each stage.
//!
//! Usage:
//!   RUST_LOG=rate_shield=debug cargo run --example resilience_patterns

use rate_shield::fallback::{CacheFallback, DefaultValueFallback, RetryFallback, StaleDataFallback};
use rate_shield::{BoxError, ManagerConfig, Operation, RateLimitManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
algorithm: token_bucket
capacity: 3
refill_rate: 2.0
failure_threshold: 2
recovery_timeout_ms: 1500
half_open_successes: 1
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== rate-shield Resilience Patterns Demo ===\n");

    let manager = RateLimitManager::<f64>::new(ManagerConfig::from_yaml_str(CONFIG)?)?;
    manager.add_fallback_strategy(Arc::new(CacheFallback::new(Duration::from_secs(1))?));
    manager.add_fallback_strategy(Arc::new(StaleDataFallback::new(Duration::from_secs(60))?));
    manager.add_fallback_strategy(Arc::new(RetryFallback::new(2, Duration::from_millis(100))));
    manager.add_fallback_strategy(Arc::new(DefaultValueFallback::new(f64::NAN)));
    println!("Fallback chain: {:?}\n", manager.fallback_names());

    let healthy = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&healthy);
    let quote = Operation::new("quote", move || {
        let flag = Arc::clone(&flag);
        async move {
            if flag.load(Ordering::SeqCst) {
                Ok(187.25)
            } else {
                Err::<f64, BoxError>("upstream 503".into())
            }
        }
    })
    .with_args(serde_json::json!({ "symbol": "AAPL" }));

    println!("--- Burst beyond capacity ---");
    for i in 1..=5 {
        report(i, manager.execute(&quote, true).await);
    }

    println!("\n--- Upstream outage ---");
    healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    for i in 1..=4 {
        report(i, manager.execute(&quote, true).await);
        println!("    circuit: {}", manager.circuit_state());
    }

    println!("\n--- Recovery ---");
    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    report(1, manager.execute(&quote, true).await);
    println!("    circuit: {}", manager.circuit_state());

    println!("\n--- Stats ---");
    println!("{}", serde_json::to_string_pretty(&manager.stats().await)?);
    Ok(())
}

fn report(i: usize, result: rate_shield::Result<f64>) {
    match result {
        Ok(price) if price.is_nan() => println!("Request {i}: default value"),
        Ok(price) => println!("Request {i}: {price:.2}"),
        Err(e) => println!("Request {i}: error: {e}"),
    }
}
