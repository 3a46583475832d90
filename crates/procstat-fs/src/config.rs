use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fuser::MountOption;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub mount_point: PathBuf,
    pub fs_name: String,
    pub allow_other: bool,
    pub auto_unmount: bool,
    /// Attribute and entry cache lifetime handed to the kernel.
    pub ttl: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/tmp/procstat"),
            fs_name: "procstat".into(),
            allow_other: false,
            auto_unmount: true,
            ttl: crate::fs::TTL,
        }
    }
}

impl MountConfig {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            ..Self::default()
        }
    }

    /// The `fuser` options for this mount. The tree is always read-only.
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fs_name.clone()),
            MountOption::RO,
            MountOption::DefaultPermissions,
        ];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        } else if self.auto_unmount {
            // fusermount refuses auto_unmount without allow_other or allow_root.
            options.push(MountOption::AllowRoot);
        }
        options
    }
}

#[derive(Parser)]
#[command(name = "procstat-demo", about = "Process statistics exposed as a FUSE filesystem")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Mount a demo statistics tree
    Mount {
        /// Mount point path
        path: PathBuf,
        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
        /// Keep the mount around if the process exits without unmounting
        #[arg(long)]
        no_auto_unmount: bool,
        /// Log level (trace, debug, info, warn, error)
        #[arg(long, default_value = "info")]
        log_level: String,
        /// How often the demo statistics are updated, in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Unmount a statistics filesystem
    Unmount {
        /// Mount point path
        path: PathBuf,
    },
    /// Show mount status
    Status {
        /// Mount point path
        path: PathBuf,
    },
}
