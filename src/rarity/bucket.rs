//! Range bucketing for raw stat values.
//!
//! A rule is an ordered list of buckets. Membership is inclusive of both the
//! declared min and max, the top bucket has no max, and a value sitting on a
//! boundary shared by two buckets belongs to the lower one. Integer rules
//! leave a gap below each min (49 to 50 for "0-49" / "50-99"); a value in
//! that gap belongs to the lower bucket, so 49.5 is "0-49". Anything below
//! the first bucket (negative values, NaN) lands in the lowest bucket.

use super::error::RarityError;

/// One labelled range of a rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub label: &'static str,
    pub min: f64,
    /// `None` marks the open top bucket
    pub max: Option<f64>,
}

impl Bucket {
    /// Bucket holding a single integral value, e.g. "2" touchdowns
    pub const fn exact(label: &'static str, value: f64) -> Self {
        Bucket {
            label,
            min: value,
            max: Some(value),
        }
    }

    pub const fn range(label: &'static str, min: f64, max: f64) -> Self {
        Bucket {
            label,
            min,
            max: Some(max),
        }
    }

    pub const fn open(label: &'static str, min: f64) -> Self {
        Bucket {
            label,
            min,
            max: None,
        }
    }
}

/// Ordered bucket table for one stat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketRule {
    pub buckets: &'static [Bucket],
}

impl BucketRule {
    /// Label for `value`, or `None` if the rule has no bucket for it (only
    /// possible for a rule without an open top bucket).
    pub fn bucket(&self, value: f64) -> Option<&'static str> {
        let value = if value.is_nan() { f64::NEG_INFINITY } else { value };
        self.buckets
            .iter()
            .enumerate()
            .find(|(i, b)| match b.max {
                None => true,
                Some(max) => {
                    value <= max
                        || self
                            .buckets
                            .get(i + 1)
                            .is_some_and(|next| value < next.min)
                }
            })
            .map(|(_, b)| b.label)
    }

    /// Position of `label` in the rule, lowest bucket first.
    pub fn ordinal(&self, label: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.label == label)
    }

    /// Check that the buckets partition the line: ascending, no overlap past
    /// a shared boundary, no gap wider than one integer step, and exactly one
    /// open bucket at the top. A gap of up to one step is covered by the
    /// bucket below it.
    pub fn validate(&self, stat: &str) -> Result<(), RarityError> {
        let invalid = |reason: String| RarityError::InvalidBucketRule {
            stat: stat.to_string(),
            reason,
        };

        let (last, rest) = self
            .buckets
            .split_last()
            .ok_or_else(|| invalid("rule has no buckets".into()))?;
        if last.max.is_some() {
            return Err(invalid(format!("top bucket '{}' is not open", last.label)));
        }

        for b in rest {
            match b.max {
                None => {
                    return Err(invalid(format!(
                        "bucket '{}' is open but is not the top bucket",
                        b.label
                    )))
                }
                Some(max) if max < b.min => {
                    return Err(invalid(format!("bucket '{}' has max < min", b.label)))
                }
                Some(_) => {}
            }
        }

        for pair in self.buckets.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            // `rest` guarantees every non-top bucket has a max
            let lo_max = lo.max.unwrap_or(f64::INFINITY);
            if hi.min < lo_max {
                return Err(invalid(format!(
                    "'{}' overlaps '{}'",
                    hi.label, lo.label
                )));
            }
            if hi.min - lo_max > 1.0 {
                return Err(invalid(format!(
                    "gap between '{}' and '{}'",
                    lo.label, hi.label
                )));
            }
            if hi.max.is_some_and(|hi_max| hi_max <= lo_max) {
                return Err(invalid(format!("'{}' is unreachable", hi.label)));
            }
        }
        Ok(())
    }
}
