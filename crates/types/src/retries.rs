// Copyright (c) 2023 - 2025 tokenflow developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Retry policies used at transaction boundaries, e.g. when committing the state of a processed
//! record fails with a transient error.

use std::cmp;
use std::num::NonZeroUsize;
use std::time::Duration;

use rand::Rng;

const DEFAULT_JITTER_MULTIPLIER: f32 = 0.3;

/// This struct represents the policy to execute retries.
///
/// To use it:
///
/// ```rust
/// use std::time::Duration;
/// use tokenflow_types::retries::RetryPolicy;
///
/// let retry_policy = RetryPolicy::fixed_delay(Duration::from_millis(100), Some(10));
/// let mut retry_iter = retry_policy.into_iter();
///
/// loop {
/// # let operation_succeeded = true;
///     if operation_succeeded {
///         break;
///     }
///
///     if let Some(next_timer) = retry_iter.next() {
///         // Sleep for next_timer
///     } else {
///         // Retries exhausted
///         break;
///     }
/// }
/// ```
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case"
)]
pub enum RetryPolicy {
    /// No retry strategy.
    #[default]
    None,
    /// Retry with a fixed delay strategy.
    FixedDelay {
        /// Interval between retries.
        ///
        /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
        #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
        interval: humantime::Duration,
        /// Number of maximum attempts before giving up. Infinite retries if unset.
        max_attempts: Option<NonZeroUsize>,
    },
    /// Retry with an exponential strategy. The next retry is computed as
    /// `min(last_retry_interval * factor, max_interval)`.
    Exponential {
        /// Initial interval for the first retry attempt.
        ///
        /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
        #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
        initial_interval: humantime::Duration,
        /// The factor to use to compute the next retry attempt.
        factor: f32,
        /// Number of maximum attempts before giving up. Infinite retries if unset.
        max_attempts: Option<NonZeroUsize>,
        /// Maximum interval between retries.
        #[serde(
            default,
            with = "serde_with::As::<Option<serde_with::DisplayFromStr>>"
        )]
        max_interval: Option<humantime::Duration>,
    },
}

impl RetryPolicy {
    /// A `max_attempts` of zero is treated as unset.
    pub fn fixed_delay(interval: Duration, max_attempts: Option<usize>) -> Self {
        Self::FixedDelay {
            interval: interval.into(),
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
        }
    }

    pub fn exponential(
        initial_interval: Duration,
        factor: f32,
        max_attempts: Option<usize>,
        max_interval: Option<Duration>,
    ) -> Self {
        Self::Exponential {
            initial_interval: initial_interval.into(),
            factor,
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
            max_interval: max_interval.map(Into::into),
        }
    }

    pub fn max_attempts(&self) -> Option<NonZeroUsize> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay { max_attempts, .. }
            | RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }
}

impl IntoIterator for RetryPolicy {
    type Item = Duration;
    type IntoIter = RetryIter;

    fn into_iter(self) -> Self::IntoIter {
        RetryIter {
            policy: self,
            attempts: 0,
            last_retry: None,
        }
    }
}

#[derive(Debug)]
pub struct RetryIter {
    policy: RetryPolicy,
    attempts: usize,
    last_retry: Option<Duration>,
}

impl RetryIter {
    /// The number of attempts on this retry iterator so far
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    fn exhausted(max_attempts: &Option<NonZeroUsize>, attempts: usize) -> bool {
        max_attempts.is_some_and(|limit| attempts > limit.into())
    }
}

impl Iterator for RetryIter {
    type Item = Duration;

    /// adds up to 30% of the target duration as jitter
    fn next(&mut self) -> Option<Self::Item> {
        self.attempts += 1;
        match &self.policy {
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay {
                interval,
                max_attempts,
            } => {
                if Self::exhausted(max_attempts, self.attempts) {
                    None
                } else {
                    Some(with_jitter((*interval).into(), DEFAULT_JITTER_MULTIPLIER))
                }
            }
            RetryPolicy::Exponential {
                initial_interval,
                factor,
                max_attempts,
                max_interval,
            } => {
                if Self::exhausted(max_attempts, self.attempts) {
                    return None;
                }
                let next_retry = match self.last_retry {
                    Some(last_retry) => cmp::min(
                        last_retry.mul_f32(*factor),
                        max_interval.map(Into::into).unwrap_or(Duration::MAX),
                    ),
                    None => (*initial_interval).into(),
                };
                self.last_retry = Some(next_retry);
                Some(with_jitter(next_retry, DEFAULT_JITTER_MULTIPLIER))
            }
        }
    }
}

// Jitter is a random duration added to the desired target, it ranges from 3ms to
// (max_multiplier * duration) of the original requested delay. The minimum of +3ms
// avoids falling into zero-ending values (0, 10, 100, etc.) which cause harmonics.
static MIN_JITTER: Duration = Duration::from_millis(3);

fn with_jitter(duration: Duration, max_multiplier: f32) -> Duration {
    let max_jitter = duration.mul_f32(max_multiplier);
    if max_jitter <= MIN_JITTER {
        duration + MIN_JITTER
    } else {
        let jitter = rand::rng().random_range(MIN_JITTER..max_jitter);
        duration + jitter
    }
}
