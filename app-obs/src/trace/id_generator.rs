//! Trace and span id generation.
use super::ids::{SpanId, TraceId};
use rand::{rngs, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Interface for generating IDs
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new, valid `TraceId`
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new, valid `SpanId`
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`]: random ids from a per-thread small RNG.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = rng.random::<u128>();
                if id != 0 {
                    return TraceId::from(id);
                }
            }
        })
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = rng.random::<u64>();
                if id != 0 {
                    return SpanId::from(id);
                }
            }
        })
    }
}

/// [`IdGenerator`] for backends with 64-bit trace ids, such as Datadog.
///
/// Only the low 64 bits of each trace id are set, so the id survives the
/// decimal `x-datadog-trace-id` header unchanged.
#[derive(Clone, Debug, Default)]
pub struct DatadogIdGenerator {
    _private: (),
}

impl IdGenerator for DatadogIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        let low = RandomIdGenerator::default().new_span_id().to_u64();
        TraceId::from(u128::from(low))
    }

    fn new_span_id(&self) -> SpanId {
        RandomIdGenerator::default().new_span_id()
    }
}

thread_local! {
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

/// [`IdGenerator`] that counts up from one, for predictable ids in tests.
///
/// Trace ids and span ids share the counter, so every id handed out is unique.
#[derive(Clone, Debug, Default)]
pub struct IncrementIdGenerator(Arc<AtomicU64>);

impl IncrementIdGenerator {
    /// Create a new [`IncrementIdGenerator`]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for IncrementIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(u128::from(self.0.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator::default();
        let ids: HashSet<_> = (0..256).map(|_| generator.new_span_id()).collect();
        assert_eq!(ids.len(), 256);
        assert!(!ids.contains(&SpanId::INVALID));
        assert_ne!(generator.new_trace_id(), TraceId::INVALID);
    }

    #[test]
    fn datadog_trace_ids_fit_in_64_bits() {
        let id = DatadogIdGenerator::default().new_trace_id();
        assert_ne!(id, TraceId::INVALID);
        assert_eq!(&id.to_bytes()[..8], &[0; 8]);
    }

    #[test]
    fn increment_ids_are_predictable() {
        let generator = IncrementIdGenerator::new();
        assert_eq!(generator.new_trace_id(), TraceId::from(1));
        assert_eq!(generator.new_span_id(), SpanId::from(2));
        assert_eq!(generator.clone().new_span_id(), SpanId::from(3));
    }
}
