//! Single-value statistics.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::StatFormatter;
use crate::context::StatsContext;
use crate::error::StatsResult;
use crate::handle::Handle;

/// How a number is printed. Every form ends with a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    /// `1234`
    #[default]
    Decimal,
    /// `4d2`
    Hex,
    /// `0x4d2`
    Address,
}

impl ValueFormat {
    pub fn write(self, out: &mut dyn fmt::Write, value: u64) -> fmt::Result {
        match self {
            ValueFormat::Decimal => writeln!(out, "{value}"),
            ValueFormat::Hex => writeln!(out, "{value:x}"),
            ValueFormat::Address => writeln!(out, "{value:#x}"),
        }
    }
}

/// Something a statistics file can sample.
pub trait StatValue: Send + Sync {
    fn sample(&self) -> u64;
}

impl StatValue for AtomicU64 {
    fn sample(&self) -> u64 {
        self.load(Ordering::Relaxed)
    }
}

impl StatValue for AtomicU32 {
    fn sample(&self) -> u64 {
        u64::from(self.load(Ordering::Relaxed))
    }
}

impl StatValue for AtomicUsize {
    fn sample(&self) -> u64 {
        self.load(Ordering::Relaxed) as u64
    }
}

impl StatValue for AtomicI64 {
    // Negative values show up as their two's complement, like `%lu` would.
    fn sample(&self) -> u64 {
        self.load(Ordering::Relaxed) as u64
    }
}

/// A shared value the application updates and the file samples.
pub struct Counter<V> {
    value: Arc<V>,
    format: ValueFormat,
}

impl<V: StatValue> Counter<V> {
    pub fn new(value: Arc<V>, format: ValueFormat) -> Self {
        Self { value, format }
    }
}

impl<V: StatValue> StatFormatter for Counter<V> {
    fn format(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.format.write(out, self.value.sample())
    }
}

/// A value computed on every read.
pub struct Getter<F> {
    get: F,
    format: ValueFormat,
}

impl<F> Getter<F>
where
    F: Fn() -> u64 + Send + Sync,
{
    pub fn new(get: F, format: ValueFormat) -> Self {
        Self { get, format }
    }
}

impl<F> StatFormatter for Getter<F>
where
    F: Fn() -> u64 + Send + Sync,
{
    fn format(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.format.write(out, (self.get)())
    }
}

/// One file to create with [`StatsContext::create_simple`].
#[derive(Clone)]
pub struct SimpleHandle {
    pub name: String,
    pub formatter: Arc<dyn StatFormatter>,
}

impl SimpleHandle {
    pub fn new(name: impl Into<String>, formatter: Arc<dyn StatFormatter>) -> Self {
        Self {
            name: name.into(),
            formatter,
        }
    }
}

impl StatsContext {
    /// Create one file per descriptor under `parent`.
    ///
    /// All or nothing: on the first failure every file created by this
    /// call is removed again.
    pub fn create_simple(
        &self,
        parent: Option<Handle>,
        descriptors: &[SimpleHandle],
    ) -> StatsResult<Vec<Handle>> {
        let mut created = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match self.create_leaf(parent, &descriptor.name, descriptor.formatter.clone()) {
                Ok(handle) => created.push(handle),
                Err(e) => {
                    self.rollback(&created);
                    return Err(e);
                }
            }
        }
        Ok(created)
    }

    /// Expose a `u64` counter in decimal.
    pub fn create_u64(
        &self,
        parent: Option<Handle>,
        name: &str,
        value: Arc<AtomicU64>,
    ) -> StatsResult<Handle> {
        self.create_leaf(parent, name, Arc::new(Counter::new(value, ValueFormat::Decimal)))
    }

    /// Expose a `u32` counter in decimal.
    pub fn create_u32(
        &self,
        parent: Option<Handle>,
        name: &str,
        value: Arc<AtomicU32>,
    ) -> StatsResult<Handle> {
        self.create_leaf(parent, name, Arc::new(Counter::new(value, ValueFormat::Decimal)))
    }

    pub(crate) fn rollback(&self, created: &[Handle]) {
        for handle in created.iter().rev() {
            self.remove(*handle);
        }
    }
}
