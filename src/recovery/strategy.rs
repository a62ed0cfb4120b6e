//! Recovery strategies.
//!
//! A strategy bundles the serializable `StrategyConfig` with an optional
//! fallback. Fallbacks are stored type-erased so strategies of any result type
//! can share one registry; the value is downcast back at the call site.

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::{CircuitBreakerConfig, RetryConfig, StrategyConfig};
use crate::error::{BoxError, RecoveryError, Result};

type ErasedValue = Box<dyn Any + Send>;
type ErasedFallback =
    Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<ErasedValue, BoxError>> + Send + Sync>;

/// Alternate code path invoked after retries are exhausted on a recoverable error.
#[derive(Clone)]
pub struct Fallback {
    run: ErasedFallback,
    produces: &'static str,
}

impl Fallback {
    pub fn new<T, E, F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        let run: ErasedFallback = Arc::new(move || {
            f().map(|outcome| {
                outcome
                    .map(|value| Box::new(value) as ErasedValue)
                    .map_err(Into::<BoxError>::into)
            })
            .boxed()
        });
        Self {
            run,
            produces: type_name::<T>(),
        }
    }

    /// A fallback that always yields a clone of `value`.
    pub fn value<T>(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::new(move || {
            let value = value.clone();
            async move { Ok::<T, BoxError>(value) }
        })
    }

    /// Name of the type this fallback produces.
    pub fn produces(&self) -> &'static str {
        self.produces
    }

    pub(crate) async fn invoke<T: 'static>(&self) -> Result<T> {
        let value = (self.run)().await.map_err(RecoveryError::Fallback)?;
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| RecoveryError::FallbackType {
                expected: type_name::<T>(),
            })
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback")
            .field("produces", &self.produces)
            .finish()
    }
}

/// Retry, breaker and fallback policy applied to an `execute()` call.
#[derive(Debug, Clone, Default)]
pub struct RecoveryStrategy {
    pub config: StrategyConfig,
    pub fallback: Option<Fallback>,
}

impl RecoveryStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            fallback: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = Some(breaker);
        self
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_state_management(mut self, enabled: bool) -> Self {
        self.config.enable_state_management = enabled;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.enable_metrics = enabled;
        self
    }
}

impl From<StrategyConfig> for RecoveryStrategy {
    fn from(config: StrategyConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_downcasts_to_operation_type() {
        let fallback = Fallback::value(String::from("cached"));
        let value: String = fallback.invoke().await.unwrap();
        assert_eq!(value, "cached");
    }

    #[tokio::test]
    async fn test_fallback_type_mismatch() {
        let fallback = Fallback::value(42u32);
        let err = fallback.invoke::<String>().await.unwrap_err();
        assert!(matches!(err, RecoveryError::FallbackType { .. }));
    }

    #[tokio::test]
    async fn test_fallback_error_is_wrapped() {
        let fallback = Fallback::new(|| async { Err::<u8, _>("cache miss") });
        let err = fallback.invoke::<u8>().await.unwrap_err();
        assert!(matches!(err, RecoveryError::Fallback(_)));
        assert_eq!(err.to_string(), "Fallback failed: cache miss");
    }

    #[test]
    fn test_builder() {
        let strategy = RecoveryStrategy::default()
            .with_circuit_breaker(CircuitBreakerConfig::default())
            .with_state_management(true)
            .with_fallback(Fallback::value(()));
        assert!(strategy.config.circuit_breaker.is_some());
        assert!(strategy.config.enable_state_management);
        assert_eq!(strategy.fallback.unwrap().produces(), "()");
    }
}
