//! Start/end pairs, exposed as a directory with a `start` and an `end` file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Counter, StatFormatter, StatValue, ValueFormat};
use crate::context::StatsContext;
use crate::error::StatsResult;
use crate::handle::Handle;

pub const START_FILE: &str = "start";
pub const END_FILE: &str = "end";

/// A pair of `u64` bounds, e.g. the first and last sequence number of a
/// batch.
#[derive(Debug, Default)]
pub struct StartEnd {
    pub start: AtomicU64,
    pub end: AtomicU64,
}

impl StartEnd {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start: AtomicU64::new(start),
            end: AtomicU64::new(end),
        }
    }

    pub fn set(&self, start: u64, end: u64) {
        self.start.store(start, Ordering::Relaxed);
        self.end.store(end, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

struct BoundValue {
    pair: Arc<StartEnd>,
    bound: Bound,
}

impl StatValue for BoundValue {
    fn sample(&self) -> u64 {
        match self.bound {
            Bound::Start => self.pair.start.load(Ordering::Relaxed),
            Bound::End => self.pair.end.load(Ordering::Relaxed),
        }
    }
}

/// One start/end directory to create with [`StatsContext::create_start_end`].
#[derive(Clone)]
pub struct StartEndHandle {
    pub name: String,
    pub start: Arc<dyn StatFormatter>,
    pub end: Arc<dyn StatFormatter>,
}

impl StartEndHandle {
    /// Descriptor for a `u64` pair printed with `format`.
    pub fn u64(name: impl Into<String>, pair: Arc<StartEnd>, format: ValueFormat) -> Self {
        let start = BoundValue {
            pair: pair.clone(),
            bound: Bound::Start,
        };
        let end = BoundValue {
            pair,
            bound: Bound::End,
        };
        Self {
            name: name.into(),
            start: Arc::new(Counter::new(Arc::new(start), format)),
            end: Arc::new(Counter::new(Arc::new(end), format)),
        }
    }
}

impl StatsContext {
    /// Create one `name/{start,end}` directory per descriptor.
    ///
    /// All or nothing, like [`StatsContext::create_simple`].
    pub fn create_start_end(
        &self,
        parent: Option<Handle>,
        descriptors: &[StartEndHandle],
    ) -> StatsResult<Vec<Handle>> {
        let mut created = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match self.create_start_end_dir(parent, descriptor) {
                Ok(handle) => created.push(handle),
                Err(e) => {
                    self.rollback(&created);
                    return Err(e);
                }
            }
        }
        Ok(created)
    }

    /// Expose a `u64` pair in decimal as `name/start` and `name/end`.
    pub fn create_start_end_u64(
        &self,
        parent: Option<Handle>,
        name: &str,
        pair: Arc<StartEnd>,
    ) -> StatsResult<Handle> {
        self.create_start_end_dir(parent, &StartEndHandle::u64(name, pair, ValueFormat::Decimal))
    }

    fn create_start_end_dir(
        &self,
        parent: Option<Handle>,
        descriptor: &StartEndHandle,
    ) -> StatsResult<Handle> {
        let dir = self.create_directory(parent, &descriptor.name)?;
        let files = self
            .create_leaf(Some(dir), START_FILE, descriptor.start.clone())
            .and_then(|_| self.create_leaf(Some(dir), END_FILE, descriptor.end.clone()));
        if let Err(e) = files {
            self.remove(dir);
            return Err(e);
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_end_files() {
        let ctx = StatsContext::new(0, 0);
        let pair = Arc::new(StartEnd::new(10, 20));
        let dir = ctx.create_start_end_u64(None, "window", pair.clone()).unwrap();

        let start = ctx.lookup(dir, START_FILE).unwrap().handle;
        let end = ctx.lookup(dir, END_FILE).unwrap().handle;
        assert_eq!(ctx.read(start, 0, 64).unwrap(), b"10\n");
        assert_eq!(ctx.read(end, 0, 64).unwrap(), b"20\n");

        pair.set(11, 42);
        assert_eq!(ctx.read(end, 0, 64).unwrap(), b"42\n");
    }

    #[test]
    fn test_create_start_end_rolls_back() {
        let ctx = StatsContext::new(0, 0);
        let pair = Arc::new(StartEnd::default());
        let descriptors = vec![
            StartEndHandle::u64("first", pair.clone(), ValueFormat::Decimal),
            StartEndHandle::u64("first", pair, ValueFormat::Hex),
        ];
        assert!(ctx.create_start_end(None, &descriptors).is_err());
        assert_eq!(ctx.live_items(), 1);
    }
}
