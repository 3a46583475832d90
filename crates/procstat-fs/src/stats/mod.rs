//! Value formatters attached to statistics files.
//!
//! A leaf in the tree carries an `Arc<dyn StatFormatter>`; reading the file
//! renders it. The formatters here cover the usual shapes:
//!
//! - [`Counter`]: a shared atomic rendered in decimal, hex or address form
//! - [`Getter`]: a closure producing the value on every read
//! - [`StartEnd`]: a directory with `start` and `end` files
//! - [`Series`]: running statistics over submitted points
//!
//! Registration helpers for each shape live on [`crate::StatsContext`].

pub mod series;
pub mod simple;
pub mod start_end;

use std::fmt;

pub use series::{Series, SeriesField, SeriesHandle, SeriesSnapshot};
pub use simple::{Counter, Getter, SimpleHandle, StatValue, ValueFormat};
pub use start_end::{StartEnd, StartEndHandle};

/// Renders the content of one statistics file.
pub trait StatFormatter: Send + Sync {
    fn format(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// Render a formatter to a `String`.
pub fn render(formatter: &dyn StatFormatter) -> String {
    let mut out = String::new();
    match formatter.format(&mut out) {
        Ok(()) => out,
        Err(_) => String::new(),
    }
}
