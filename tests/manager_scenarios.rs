use rate_shield::fallback::{CacheFallback, DefaultValueFallback};
use rate_shield::resilience::{CircuitBreakerConfig, CircuitState, RateLimiterConfig};
use rate_shield::{BoxError, Error, ManagerConfig, Operation, RateLimitManager};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn always_failing(calls: Arc<AtomicU32>) -> Operation<f64> {
    Operation::new("quote", move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<f64, BoxError>("upstream 500".into())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_token_bucket_burst_then_denied() {
    let config = ManagerConfig::default()
        .with_rate_limiter(RateLimiterConfig::token_bucket(5, 1.0));
    let manager = RateLimitManager::<f64>::new(config).unwrap();
    let op = Operation::new("quote", || async { Ok::<f64, BoxError>(101.5) });

    for _ in 0..5 {
        assert_eq!(manager.execute(&op, false).await.unwrap(), 101.5);
    }
    let err = manager.execute(&op, false).await.unwrap_err();
    match err {
        Error::RateLimitExceeded {
            algorithm,
            retry_after,
        } => {
            assert_eq!(algorithm, "token_bucket");
            assert!(retry_after.unwrap() <= Duration::from_secs(1));
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }

    let stats = manager.stats().await;
    assert_eq!(stats.counters.total_requests, 6);
    assert_eq!(stats.counters.allowed_requests, 5);
    assert_eq!(stats.counters.blocked_requests, 1);
    assert_eq!(stats.admission.available, Some(0));

    // one refill interval later exactly one more call gets through
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(manager.execute(&op, false).await.is_ok());
    assert!(manager.execute(&op, false).await.unwrap_err().is_rate_limited());
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_then_retries_after_recovery() {
    let config = ManagerConfig::default().with_circuit_breaker(
        CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_secs(10)),
    );
    let manager = RateLimitManager::<f64>::new(config).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let op = always_failing(Arc::clone(&calls));

    for _ in 0..3 {
        let err = manager.execute(&op, false).await.unwrap_err();
        assert!(err.is_upstream(), "unexpected error: {err}");
    }
    assert_eq!(manager.circuit_state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_secs(1)).await;
    match manager.execute(&op, false).await.unwrap_err() {
        Error::CircuitOpen { retry_after } => {
            assert_eq!(retry_after, Duration::from_secs(9));
        }
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_secs(10)).await;
    let err = manager.execute(&op, false).await.unwrap_err();
    assert!(err.is_upstream());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // the failed trial call re-opens the circuit
    assert_eq!(manager.circuit_state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_closes_after_three_successes() {
    let config = ManagerConfig::default().with_circuit_breaker(
        CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout(Duration::from_secs(5)),
    );
    let manager = RateLimitManager::<u32>::new(config).unwrap();
    let healthy = Arc::new(AtomicU32::new(0));
    let flag = Arc::clone(&healthy);
    let op = Operation::new("status", move || {
        let flag = Arc::clone(&flag);
        async move {
            if flag.load(Ordering::SeqCst) == 1 {
                Ok(200u32)
            } else {
                Err::<u32, BoxError>("down".into())
            }
        }
    });

    assert!(manager.execute(&op, false).await.is_err());
    assert_eq!(manager.circuit_state(), CircuitState::Open);

    healthy.store(1, Ordering::SeqCst);
    tokio::time::advance(Duration::from_secs(5)).await;
    for _ in 0..2 {
        assert_eq!(manager.execute(&op, false).await.unwrap(), 200);
        assert_eq!(manager.circuit_state(), CircuitState::HalfOpen);
    }
    assert_eq!(manager.execute(&op, false).await.unwrap(), 200);
    assert_eq!(manager.circuit_state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_cached_value_served_when_throttled() {
    let config = ManagerConfig::default()
        .with_rate_limiter(RateLimiterConfig::token_bucket(1, 0.01));
    let manager = RateLimitManager::<f64>::new(config).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let op = Operation::new("quote", move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<f64, BoxError>(190.0)
        }
    })
    .with_args(serde_json::json!({ "symbol": "AAPL" }));

    let cache = Arc::new(CacheFallback::new(Duration::from_secs(300)).unwrap());
    cache.store(op.key(), &187.25f64).await.unwrap();
    manager.add_fallback_strategy(cache);

    assert!(manager.limiter().try_acquire(1).await);
    assert_eq!(manager.execute(&op, true).await.unwrap(), 187.25);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let stats = manager.counters();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.blocked_requests, 1);
    assert_eq!(stats.fallback_requests, 1);
    assert_eq!(stats.allowed_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_successful_calls_refresh_the_cache() {
    let config = ManagerConfig::default()
        .with_rate_limiter(RateLimiterConfig::token_bucket(1, 0.01));
    let manager = RateLimitManager::<f64>::new(config).unwrap();
    manager.add_fallback_strategy(Arc::new(
        CacheFallback::new(Duration::from_secs(60)).unwrap(),
    ));

    let op = Operation::new("quote", || async { Ok::<f64, BoxError>(42.0) })
        .with_args(serde_json::json!({ "symbol": "MSFT" }));
    assert_eq!(manager.execute(&op, true).await.unwrap(), 42.0);
    // bucket is now empty: the second call is answered from the cache
    assert_eq!(manager.execute(&op, true).await.unwrap(), 42.0);
    assert_eq!(manager.counters().fallback_requests, 1);

    // a different argument set has no cached entry
    let other = Operation::new("quote", || async { Ok::<f64, BoxError>(1.0) })
        .with_args(serde_json::json!({ "symbol": "TSLA" }));
    let err = manager.execute(&other, true).await.unwrap_err();
    assert_eq!(err.fallback_failures().map(|f| f.len()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_served_by_default_value() {
    let config = ManagerConfig::default().with_circuit_breaker(
        CircuitBreakerConfig::new().with_failure_threshold(1),
    );
    let manager = RateLimitManager::<f64>::new(config).unwrap();
    manager.add_fallback_strategy(Arc::new(DefaultValueFallback::new(-1.0)));

    let calls = Arc::new(AtomicU32::new(0));
    let op = always_failing(Arc::clone(&calls));
    assert_eq!(manager.execute(&op, true).await.unwrap(), -1.0);
    assert_eq!(manager.execute(&op, true).await.unwrap(), -1.0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = manager.stats().await;
    assert_eq!(stats.circuit.state, CircuitState::Open);
    assert_eq!(stats.counters.fallback_requests, 2);
    assert_eq!(stats.counters.blocked_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_never_exceed_capacity() {
    let config = ManagerConfig::default()
        .with_rate_limiter(RateLimiterConfig::token_bucket(10, 0.001));
    let manager = Arc::new(RateLimitManager::<u32>::new(config).unwrap());
    let op = Operation::new("ping", || async { Ok::<u32, BoxError>(1) });

    let mut handles = Vec::new();
    for _ in 0..50 {
        let manager = Arc::clone(&manager);
        let op = op.clone();
        handles.push(tokio::spawn(async move { manager.execute(&op, false).await }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
    let stats = manager.counters();
    assert_eq!(stats.total_requests, 50);
    assert_eq!(stats.blocked_requests, 40);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_availability_is_cancellable() {
    let config = ManagerConfig::default()
        .with_rate_limiter(RateLimiterConfig::token_bucket(1, 0.1));
    let manager = Arc::new(RateLimitManager::<u32>::new(config).unwrap());
    let cancel = rate_shield::CancellationToken::new();

    manager.wait_for_availability(1, &cancel).await.unwrap();

    let waiter = {
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.wait_for_availability(1, &cancel).await })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    cancel.cancel();
    assert!(matches!(waiter.await.unwrap(), Err(Error::Cancelled)));

    // the abandoned wait consumed nothing: a token is ready once it has refilled
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(manager.limiter().try_acquire(1).await);
}

#[tokio::test(start_paused = true)]
async fn test_tiny_refill_rate_reports_saturated_retry_after() {
    let config = ManagerConfig::from_yaml_str("capacity: 1\nrefill_rate: 1.0e-20\n").unwrap();
    let manager = RateLimitManager::<u32>::new(config).unwrap();
    let op = Operation::new("quote", || async { Ok::<u32, BoxError>(1) });

    assert_eq!(manager.execute(&op, false).await.unwrap(), 1);
    match manager.execute(&op, false).await.unwrap_err() {
        Error::RateLimitExceeded { retry_after, .. } => {
            assert_eq!(retry_after, Some(Duration::MAX));
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
    assert!(manager.stats().await.admission.estimated_wait_ms.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_reported_budget_limits_execute() {
    let manager = RateLimitManager::<u32>::new(ManagerConfig::default()).unwrap();
    manager.update_budget(Some(2), None).await;
    let op = Operation::new("quote", || async { Ok::<u32, BoxError>(1) });

    assert!(manager.execute(&op, false).await.is_ok());
    assert!(manager.execute(&op, false).await.is_ok());
    assert!(manager.execute(&op, false).await.unwrap_err().is_rate_limited());
    assert_eq!(manager.counters().blocked_requests, 1);
}
