//! Process statistics exposed as a read-only FUSE filesystem.
//!
//! An application registers directories and statistics files in a
//! [`StatsContext`]; the kernel sees them through [`ProcStatFs`]. Items are
//! reference counted: one reference while registered, one per outstanding
//! kernel lookup. A removed item disappears from lookups and listings at once
//! and answers `ENOENT` through handles the kernel still holds; it is freed,
//! and its name becomes available again, once the last `forget` arrives.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicU64;
//!
//! use procstat::{MountConfig, ProcStat};
//!
//! let stats = ProcStat::create(&MountConfig::new("/tmp/procstat"))?;
//! let jobs = stats.context().create_directory(None, "jobs")?;
//! let done = Arc::new(AtomicU64::new(0));
//! stats.context().create_u64(Some(jobs), "done", done.clone())?;
//! # Ok::<(), procstat::StatsError>(())
//! ```

pub mod attr;
pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod handle;
pub mod item;
pub mod listing;
pub mod mount;
pub mod name;
pub mod permissions;
pub mod protocol;
pub mod stats;
pub mod tree;

pub use attr::{ItemAttr, ItemType};
pub use config::MountConfig;
pub use context::StatsContext;
pub use error::{StatsError, StatsResult};
pub use fs::ProcStatFs;
pub use handle::Handle;
pub use mount::{serve, ProcStat};
pub use stats::{
    Counter, Getter, Series, SeriesHandle, SimpleHandle, StartEnd, StartEndHandle,
    StatFormatter, ValueFormat,
};
