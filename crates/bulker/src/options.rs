use crate::error::OptionsError;
use core::time::Duration;

/// Default number of requests that close a batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default time a batch stays open after its first request.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

/// Immutable configuration of an [`Accumulator`](crate::Accumulator).
///
/// A batch is dispatched as soon as `max_batch_size` requests are pending, or
/// once `window` has elapsed since the first request entered it, whichever
/// happens first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AccumulatorOptions {
    /// Maximum number of requests in one batch.
    pub max_batch_size: usize,

    /// The maximum time a batch waits to fill up after its first request
    /// arrived. The batch is processed when it elapses even if
    /// `max_batch_size` was not reached.
    pub window: Duration,

    /// Whether each request of a failed batch is retried on its own.
    ///
    /// Useful when a batch may contain a few invalid items that make the whole
    /// bulk call fail: the valid items still succeed and only the invalid ones
    /// report an error.
    pub fallback_to_single_on_error: bool,
}

impl Default for AccumulatorOptions {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            window: DEFAULT_WINDOW,
            fallback_to_single_on_error: true,
        }
    }
}

impl AccumulatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub const fn with_fallback_to_single_on_error(mut self, enabled: bool) -> Self {
        self.fallback_to_single_on_error = enabled;
        self
    }

    /// Checks that both batch triggers can fire.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::ZeroBatchSize`] if `max_batch_size` is 0 and
    /// [`OptionsError::ZeroWindow`] if `window` is zero.
    pub const fn validate(&self) -> Result<(), OptionsError> {
        if self.max_batch_size == 0 {
            return Err(OptionsError::ZeroBatchSize);
        }
        if self.window.is_zero() {
            return Err(OptionsError::ZeroWindow);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = AccumulatorOptions::default();
        assert_eq!(options.max_batch_size, 100);
        assert_eq!(options.window, Duration::from_millis(50));
        assert!(options.fallback_to_single_on_error);
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn builder_overrides_fields() {
        let options = AccumulatorOptions::new()
            .with_max_batch_size(7)
            .with_window(Duration::from_millis(3))
            .with_fallback_to_single_on_error(false);
        assert_eq!(options.max_batch_size, 7);
        assert_eq!(options.window, Duration::from_millis(3));
        assert!(!options.fallback_to_single_on_error);
    }

    #[test]
    fn rejects_zero_triggers() {
        let options = AccumulatorOptions::new().with_max_batch_size(0);
        assert_eq!(options.validate(), Err(OptionsError::ZeroBatchSize));

        let options = AccumulatorOptions::new().with_window(Duration::ZERO);
        assert_eq!(options.validate(), Err(OptionsError::ZeroWindow));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_config() {
        let options: AccumulatorOptions =
            serde_json::from_str(r#"{ "max_batch_size": 16 }"#).unwrap();
        assert_eq!(options.max_batch_size, 16);
        assert_eq!(options.window, DEFAULT_WINDOW);
        assert!(options.fallback_to_single_on_error);
    }
}
