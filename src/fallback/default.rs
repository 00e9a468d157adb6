use super::{FallbackContext, FallbackResult, FallbackStrategy};
use async_trait::async_trait;

/// Always answers with a fixed value. Usually registered last.
pub struct DefaultValueFallback<T> {
    value: T,
}

impl<T> DefaultValueFallback<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

#[async_trait]
impl<T> FallbackStrategy<T> for DefaultValueFallback<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "default_value"
    }

    async fn execute(&self, _ctx: &FallbackContext<'_, T>) -> FallbackResult<T> {
        Ok(self.value.clone())
    }
}
