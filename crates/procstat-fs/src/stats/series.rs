//! Running statistics over a stream of `u64` points.
//!
//! Mean and variance are updated on every submitted point (Welford's
//! method); average and standard deviation are derived when read. A series
//! named `latency` shows up as:
//!
//! ```text
//! latency/
//!   count  sum  min  max  last  avg  mean  variance  stddev
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::StatFormatter;
use crate::context::StatsContext;
use crate::error::StatsResult;
use crate::handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeriesSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
    pub last: u64,
    pub mean: f64,
    /// Sum of squared distances from the mean.
    pub aggregated_variance: f64,
}

impl SeriesSnapshot {
    /// Integer average, `sum / count`.
    pub fn average(&self) -> u64 {
        self.sum.checked_div(self.count).unwrap_or(0)
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.aggregated_variance / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[derive(Debug, Default)]
pub struct Series {
    state: Mutex<SeriesSnapshot>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&self, value: u64) {
        let mut state = self.state.lock();
        state.count += 1;
        state.sum = state.sum.wrapping_add(value);
        state.last = value;
        if state.count == 1 {
            state.min = value;
            state.max = value;
        } else {
            state.min = state.min.min(value);
            state.max = state.max.max(value);
        }

        let value = value as f64;
        let delta = value - state.mean;
        state.mean += delta / state.count as f64;
        state.aggregated_variance += delta * (value - state.mean);
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        *self.state.lock()
    }

    pub fn reset(&self) {
        *self.state.lock() = SeriesSnapshot::default();
    }
}

/// One file of a series directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesField {
    Count,
    Sum,
    Min,
    Max,
    Last,
    Average,
    Mean,
    Variance,
    Stddev,
}

impl SeriesField {
    pub const ALL: [SeriesField; 9] = [
        SeriesField::Count,
        SeriesField::Sum,
        SeriesField::Min,
        SeriesField::Max,
        SeriesField::Last,
        SeriesField::Average,
        SeriesField::Mean,
        SeriesField::Variance,
        SeriesField::Stddev,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            SeriesField::Count => "count",
            SeriesField::Sum => "sum",
            SeriesField::Min => "min",
            SeriesField::Max => "max",
            SeriesField::Last => "last",
            SeriesField::Average => "avg",
            SeriesField::Mean => "mean",
            SeriesField::Variance => "variance",
            SeriesField::Stddev => "stddev",
        }
    }

    pub fn value(self, snapshot: &SeriesSnapshot) -> u64 {
        match self {
            SeriesField::Count => snapshot.count,
            SeriesField::Sum => snapshot.sum,
            SeriesField::Min => snapshot.min,
            SeriesField::Max => snapshot.max,
            SeriesField::Last => snapshot.last,
            SeriesField::Average => snapshot.average(),
            SeriesField::Mean => snapshot.mean as u64,
            SeriesField::Variance => snapshot.variance() as u64,
            SeriesField::Stddev => snapshot.stddev() as u64,
        }
    }
}

struct SeriesFile {
    series: Arc<Series>,
    field: SeriesField,
}

impl StatFormatter for SeriesFile {
    fn format(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "{}", self.field.value(&self.series.snapshot()))
    }
}

/// One series to create with [`StatsContext::create_multiple_u64_series`].
#[derive(Debug, Clone)]
pub struct SeriesHandle {
    pub name: String,
    pub series: Arc<Series>,
}

impl StatsContext {
    /// Expose `series` as directory `name` under `parent`.
    pub fn create_u64_series(
        &self,
        parent: Option<Handle>,
        name: &str,
        series: Arc<Series>,
    ) -> StatsResult<Handle> {
        let dir = self.create_directory(parent, name)?;
        for field in SeriesField::ALL {
            let file = SeriesFile {
                series: series.clone(),
                field,
            };
            if let Err(e) = self.create_leaf(Some(dir), field.file_name(), Arc::new(file)) {
                self.remove(dir);
                return Err(e);
            }
        }
        Ok(dir)
    }

    /// All or nothing, like [`StatsContext::create_simple`].
    pub fn create_multiple_u64_series(
        &self,
        parent: Option<Handle>,
        descriptors: &[SeriesHandle],
    ) -> StatsResult<Vec<Handle>> {
        let mut created = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match self.create_u64_series(parent, &descriptor.name, descriptor.series.clone()) {
                Ok(handle) => created.push(handle),
                Err(e) => {
                    self.rollback(&created);
                    return Err(e);
                }
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_series() {
        let snapshot = Series::new().snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.average(), 0);
        assert_eq!(snapshot.variance(), 0.0);
    }

    #[test]
    fn test_add_points() {
        let series = Series::new();
        for value in [2, 4, 4, 4, 5, 5, 7, 9] {
            series.add_point(value);
        }
        let snapshot = series.snapshot();
        assert_eq!(snapshot.count, 8);
        assert_eq!(snapshot.sum, 40);
        assert_eq!(snapshot.min, 2);
        assert_eq!(snapshot.max, 9);
        assert_eq!(snapshot.last, 9);
        assert_eq!(snapshot.average(), 5);
        assert!((snapshot.mean - 5.0).abs() < 1e-9);
        assert!((snapshot.variance() - 4.0).abs() < 1e-9);
        assert!((snapshot.stddev() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let series = Series::new();
        series.add_point(3);
        series.reset();
        assert_eq!(series.snapshot(), SeriesSnapshot::default());
    }

    #[test]
    fn test_series_directory() {
        let ctx = StatsContext::new(0, 0);
        let series = Arc::new(Series::new());
        let dir = ctx.create_u64_series(None, "latency", series.clone()).unwrap();
        series.add_point(10);
        series.add_point(30);

        let listing = ctx.readdir(dir, usize::MAX, 0).unwrap();
        let names: Vec<_> = crate::listing::entries(&listing).map(|e| e.name.to_string()).collect();
        let expected: Vec<_> = SeriesField::ALL.iter().map(|f| f.file_name().to_string()).collect();
        assert_eq!(names, expected);

        let avg = ctx.lookup(dir, "avg").unwrap().handle;
        assert_eq!(ctx.read(avg, 0, 64).unwrap(), b"20\n");
        let stddev = ctx.lookup(dir, "stddev").unwrap().handle;
        assert_eq!(ctx.read(stddev, 0, 64).unwrap(), b"10\n");
    }

    #[test]
    fn test_multiple_series_rolls_back() {
        let ctx = StatsContext::new(0, 0);
        ctx.create_directory(None, "taken").unwrap();
        let descriptors = vec![
            SeriesHandle {
                name: "ok".into(),
                series: Arc::new(Series::new()),
            },
            SeriesHandle {
                name: "taken".into(),
                series: Arc::new(Series::new()),
            },
        ];
        assert!(ctx.create_multiple_u64_series(None, &descriptors).is_err());
        assert_eq!(ctx.live_items(), 2);
    }
}
