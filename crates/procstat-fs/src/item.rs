//! Tree nodes: directories and leaves.

use std::fmt;
use std::sync::Arc;

use crate::handle::Handle;
use crate::name::{name_hash, Name};
use crate::stats::StatFormatter;

pub enum ItemKind {
    /// Children in insertion order; the directory owns them.
    Directory { children: Vec<Handle> },
    /// Renders the file content on read.
    Leaf { payload: Arc<dyn StatFormatter> },
}

impl ItemKind {
    pub fn directory() -> Self {
        ItemKind::Directory {
            children: Vec::new(),
        }
    }

    pub fn leaf(payload: Arc<dyn StatFormatter>) -> Self {
        ItemKind::Leaf { payload }
    }
}

impl fmt::Debug for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Directory { children } => f
                .debug_struct("Directory")
                .field("children", children)
                .finish(),
            ItemKind::Leaf { .. } => f.write_str("Leaf"),
        }
    }
}

#[derive(Debug)]
pub struct Item {
    pub name: Name,
    pub name_hash: u32,
    /// Back-reference only; cleared once the item is detached.
    pub parent: Option<Handle>,
    pub refcount: u64,
    pub registered: bool,
    pub kind: ItemKind,
}

impl Item {
    /// A fresh, not yet registered item.
    pub fn new(name: &str, kind: ItemKind) -> Self {
        Self {
            name: Name::new(name),
            name_hash: name_hash(name),
            parent: None,
            refcount: 0,
            registered: false,
            kind,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, ItemKind::Directory { .. })
    }

    pub fn children(&self) -> &[Handle] {
        match &self.kind {
            ItemKind::Directory { children } => children,
            ItemKind::Leaf { .. } => &[],
        }
    }

    pub fn payload(&self) -> Option<&Arc<dyn StatFormatter>> {
        match &self.kind {
            ItemKind::Leaf { payload } => Some(payload),
            ItemKind::Directory { .. } => None,
        }
    }

    /// Hash first, then the full comparison.
    pub fn has_name(&self, name: &str, hash: u32) -> bool {
        self.name_hash == hash && self.name == *name
    }
}
