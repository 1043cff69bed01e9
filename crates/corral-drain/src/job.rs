// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use corral_filter::{metadata_match, DeviceMetadata, FilterSet};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// A single-key filter predicate restricting which devices a drain job
/// touches. Devices whose metadata/claims don't match are skipped instead
/// of drained.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainFilter {
    /// The metadata/claims key to consult.
    pub key: String,
    /// The set of values that count as a match.
    pub values: FilterSet,
}

impl DrainFilter {
    /// Whether `metadata` matches this filter (and so should be drained
    /// rather than skipped).
    pub fn matches(&self, metadata: &dyn DeviceMetadata) -> bool {
        metadata_match(&self.key, &self.values, metadata).is_some()
    }
}

/// Drain job parameters, before or after normalization against the
/// registry's current length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Job {
    /// Total devices to disconnect. Normalized to the registry length when
    /// both this and `percent` are zero.
    pub count: u64,
    /// If positive, `count` is recomputed at job start as
    /// `floor(registry_len * percent / 100)`.
    pub percent: u8,
    /// Devices per tick; zero means disconnect as fast as possible.
    pub rate: u64,
    /// Interval between batches when `rate > 0`.
    pub tick: Duration,
    /// Optional predicate restricting which devices are drained.
    pub drain_filter: Option<DrainFilter>,
}

impl Job {
    /// Normalizes `count`, `rate`, and `tick` against the registry's
    /// current length, per `spec.md` §3's `Job` invariants.
    pub fn normalize(mut self, registry_len: u64) -> Self {
        if self.percent > 0 {
            self.count = registry_len * u64::from(self.percent) / 100;
        } else if self.count == 0 {
            self.count = registry_len;
        }

        if self.rate == 0 {
            self.tick = Duration::ZERO;
        } else if self.tick.is_zero() {
            self.tick = Duration::from_secs(1);
        }

        self
    }
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

impl Serialize for Job {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let field_count = 1
            + usize::from(self.percent != 0)
            + usize::from(self.rate != 0)
            + usize::from(!self.tick.is_zero())
            + usize::from(self.drain_filter.is_some());
        let mut state = serializer.serialize_struct("Job", field_count)?;
        state.serialize_field("count", &self.count)?;
        if self.percent != 0 {
            state.serialize_field("percent", &self.percent)?;
        }
        if self.rate != 0 {
            state.serialize_field("rate", &self.rate)?;
        }
        if !self.tick.is_zero() {
            state.serialize_field("tick", &format_duration(self.tick))?;
        }
        if let Some(filter) = &self.drain_filter {
            #[derive(Serialize)]
            struct FilterWire<'a> {
                key: &'a str,
                values: &'a FilterSet,
            }
            state.serialize_field(
                "filter",
                &FilterWire {
                    key: &filter.key,
                    values: &filter.values,
                },
            )?;
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_count_and_percent_normalizes_to_registry_length() {
        let job = Job::default().normalize(1709);
        assert_eq!(job.count, 1709);
    }

    #[test]
    fn percent_overrides_count() {
        let job = Job {
            percent: 50,
            ..Job::default()
        }
        .normalize(2000);
        assert_eq!(job.count, 1000);
    }

    #[test]
    fn rate_zero_zeroes_tick() {
        let job = Job {
            rate: 0,
            tick: Duration::from_secs(5),
            ..Job::default()
        }
        .normalize(100);
        assert_eq!(job.tick, Duration::ZERO);
    }

    #[test]
    fn rate_without_tick_defaults_to_one_second() {
        let job = Job {
            rate: 100,
            ..Job::default()
        }
        .normalize(100);
        assert_eq!(job.tick, Duration::from_secs(1));
    }

    #[test]
    fn serializes_omitting_zero_fields() {
        let job = Job {
            count: 10,
            ..Job::default()
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json, serde_json::json!({"count": 10}));
    }

    #[test]
    fn serializes_with_rate_and_tick() {
        let job = Job {
            count: 10,
            rate: 5,
            tick: Duration::from_secs(2),
            ..Job::default()
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json, serde_json::json!({"count": 10, "rate": 5, "tick": "2s"}));
    }
}
