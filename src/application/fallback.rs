// Ordered endpoint strategies with first-success semantics
use crate::application::transport::TransportError;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FallbackError {
    #[error("no endpoint strategies configured")]
    NoStrategies,
    #[error("{last}")]
    Exhausted { attempts: usize, last: TransportError },
}

/// A successful attempt together with the index of the strategy that produced it.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub strategy: usize,
}

/// Something with a name that shows up in logs.
pub trait Strategy {
    fn name(&self) -> &str;
}

/// Try each strategy in order until one succeeds or all are exhausted.
pub async fn first_success<'a, S, T, F, Fut>(
    strategies: &'a [S],
    mut attempt: F,
) -> Result<Attempted<T>, FallbackError>
where
    S: Strategy,
    F: FnMut(&'a S) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut last = None;

    for (index, strategy) in strategies.iter().enumerate() {
        match attempt(strategy).await {
            Ok(value) => {
                if index > 0 {
                    tracing::info!("Endpoint strategy '{}' succeeded after fallback", strategy.name());
                }
                return Ok(Attempted { value, strategy: index });
            }
            Err(e) => {
                tracing::warn!("Endpoint strategy '{}' failed: {}", strategy.name(), e);
                last = Some(e);
            }
        }
    }

    match last {
        Some(last) => Err(FallbackError::Exhausted {
            attempts: strategies.len(),
            last,
        }),
        None => Err(FallbackError::NoStrategies),
    }
}
