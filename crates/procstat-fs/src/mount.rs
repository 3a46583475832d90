//! Mount lifecycle.
//!
//! [`ProcStat`] owns a background FUSE session over a fresh
//! [`StatsContext`]. Dropping it, or calling [`ProcStat::destroy`], unmounts
//! and joins the session thread before releasing the tree, so no request can
//! observe a half torn down tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::MountConfig;
use crate::context::StatsContext;
use crate::error::{StatsError, StatsResult};
use crate::fs::ProcStatFs;

pub struct ProcStat {
    context: Arc<StatsContext>,
    session: Option<fuser::BackgroundSession>,
    mount_point: PathBuf,
}

impl ProcStat {
    /// Create the mount point if needed and start serving an empty tree.
    pub fn create(config: &MountConfig) -> StatsResult<Self> {
        if config.mount_point.as_os_str().is_empty() {
            return Err(StatsError::InvalidArgument("mount point cannot be empty"));
        }
        std::fs::create_dir_all(&config.mount_point)?;

        let context = Arc::new(StatsContext::for_current_user());
        let fs = ProcStatFs::with_ttl(context.clone(), config.ttl);
        let session = fuser::spawn_mount2(fs, &config.mount_point, &config.mount_options())?;
        info!(mount_point = %config.mount_point.display(), "procstat mounted");

        Ok(Self {
            context,
            session: Some(session),
            mount_point: config.mount_point.clone(),
        })
    }

    /// The tree served by this mount, for registering statistics.
    pub fn context(&self) -> &Arc<StatsContext> {
        &self.context
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Unmount, wait for the session thread to exit, then release every item.
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // The rest of the session drops at the end of the block, which
        // unmounts; the thread itself is only stopped by joining it.
        let guard = {
            let session = session;
            session.guard
        };
        let mount_point = self.mount_point.display();
        match guard.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%mount_point, "session ended with error: {e}"),
            Err(_) => error!(%mount_point, "session thread panicked"),
        }
        info!(%mount_point, "procstat unmounted");

        // No kernel request can reach the tree anymore.
        self.context.teardown();
    }
}

impl Drop for ProcStat {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ProcStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcStat")
            .field("mount_point", &self.mount_point)
            .field("mounted", &self.session.is_some())
            .finish()
    }
}

/// Serve `context` at the configured mount point on the calling thread
/// until the filesystem is unmounted.
pub fn serve(context: Arc<StatsContext>, config: &MountConfig) -> StatsResult<()> {
    std::fs::create_dir_all(&config.mount_point)?;
    let fs = ProcStatFs::with_ttl(context, config.ttl);
    info!(mount_point = %config.mount_point.display(), "procstat serving");
    fuser::mount2(fs, &config.mount_point, &config.mount_options())?;
    info!(mount_point = %config.mount_point.display(), "procstat unmounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mount_point_rejected() {
        let config = MountConfig::new("");
        assert!(matches!(
            ProcStat::create(&config),
            Err(StatsError::InvalidArgument(_))
        ));
    }
}
