use crate::cache::{CacheKey, CacheKeyGenerator};
use crate::error::BoxError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

pub type OperationResult<T> = std::result::Result<T, BoxError>;

type CallFn<T> = dyn Fn() -> BoxFuture<'static, OperationResult<T>> + Send + Sync;

/// A re-invocable protected call.
///
/// The closure is called once per attempt, so retries and alternate providers get a
/// fresh future each time. The [`CacheKey`] is derived from the name and arguments.
pub struct Operation<T> {
    name: String,
    key: CacheKey,
    call: Arc<CallFn<T>>,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            key: self.key.clone(),
            call: Arc::clone(&self.call),
        }
    }
}

impl<T: Send + 'static> Operation<T> {
    pub fn new<F, Fut, E>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let name = name.into();
        let key = CacheKeyGenerator::new().generate(&name, &serde_json::Value::Null);
        let call = move || f().map(|res| res.map_err(Into::<BoxError>::into)).boxed();
        Self {
            name,
            key,
            call: Arc::new(call),
        }
    }

    /// Bind call arguments into the cache identity.
    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.key = CacheKeyGenerator::new().generate(&self.name, &args);
        self
    }

    /// Override the derived key.
    pub fn with_key(mut self, key: CacheKey) -> Self {
        self.key = key;
        self
    }

    /// Start one attempt.
    pub fn invoke(&self) -> BoxFuture<'static, OperationResult<T>> {
        (self.call)()
    }
}

impl<T> Operation<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("key", &self.key.hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_invoke_runs_closure_each_time() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let op = Operation::new("tick", move || {
            let c = Arc::clone(&c);
            async move { Ok::<_, BoxError>(c.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        assert_eq!(op.invoke().await.unwrap(), 1);
        assert_eq!(op.clone().invoke().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_boxed() {
        let op = Operation::new("broken", || async {
            Err::<u32, _>(std::io::Error::new(std::io::ErrorKind::Other, "reset by peer"))
        });
        let err = op.invoke().await.unwrap_err();
        assert_eq!(err.to_string(), "reset by peer");
    }

    #[test]
    fn test_key_follows_arguments() {
        let a = Operation::new("quote", || async { Ok::<u32, BoxError>(1) })
            .with_args(json!({"symbol": "AAPL"}));
        let b = Operation::new("quote", || async { Ok::<u32, BoxError>(1) })
            .with_args(json!({"symbol": "AAPL"}));
        let c = Operation::new("quote", || async { Ok::<u32, BoxError>(1) })
            .with_args(json!({"symbol": "TSLA"}));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }
}
