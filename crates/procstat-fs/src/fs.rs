use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen,
    ReplyStatfs, Request as FuseRequest,
};
use tracing::{debug, error, info};

use crate::context::StatsContext;
use crate::error::StatsError;
use crate::handle::Handle;
use crate::listing;
use crate::name::MAX_NAME_LEN;

/// Default TTL for FUSE reply caching.
pub const TTL: Duration = Duration::from_secs(1);

/// The `fuser` adapter over a shared [`StatsContext`].
///
/// Every request is answered from the tree; nothing is cached here, so
/// open and opendir hand out file handle 0.
pub struct ProcStatFs {
    context: Arc<StatsContext>,
    ttl: Duration,
}

impl ProcStatFs {
    pub fn new(context: Arc<StatsContext>) -> Self {
        Self::with_ttl(context, TTL)
    }

    pub fn with_ttl(context: Arc<StatsContext>, ttl: Duration) -> Self {
        Self { context, ttl }
    }

    pub fn context(&self) -> &Arc<StatsContext> {
        &self.context
    }
}

impl Filesystem for ProcStatFs {
    fn init(
        &mut self,
        _req: &FuseRequest<'_>,
        _config: &mut KernelConfig,
    ) -> Result<(), libc::c_int> {
        info!(live_items = self.context.live_items(), "procstat session started");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("procstat session ended");
    }

    fn lookup(&mut self, _req: &FuseRequest<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        debug!("lookup: parent={parent} name={name_str:?}");

        match self.context.lookup(Handle::from_ino(parent), name_str) {
            Ok(attr) => {
                let generation = u64::from(attr.handle.generation());
                reply.entry(
                    &self.ttl,
                    &attr.to_file_attr(self.context.created()),
                    generation,
                );
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn forget(&mut self, _req: &FuseRequest<'_>, ino: u64, nlookup: u64) {
        debug!("forget: ino={ino} nlookup={nlookup}");
        if let Err(e) = self.context.forget(Handle::from_ino(ino), nlookup) {
            error!("forget: ino={ino}: {e}");
            if matches!(e, StatsError::ProtocolViolation { .. }) {
                panic!("kernel reference accounting diverged: {e}");
            }
        }
    }

    fn getattr(
        &mut self,
        _req: &FuseRequest<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: ReplyAttr,
    ) {
        debug!("getattr: ino={ino}");
        match self.context.getattr(Handle::from_ino(ino)) {
            Ok(attr) => reply.attr(&self.ttl, &attr.to_file_attr(self.context.created())),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn opendir(&mut self, _req: &FuseRequest<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir: ino={ino}");
        match self.context.opendir(Handle::from_ino(ino)) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &FuseRequest<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={ino} offset={offset}");

        let offset = u64::try_from(offset).unwrap_or(0);
        let window = match self.context.readdir(Handle::from_ino(ino), usize::MAX, offset) {
            Ok(window) => window,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        for entry in listing::entries(&window) {
            // reply.add returns true when the buffer is full.
            if reply.add(
                entry.ino,
                entry.next_offset as i64,
                entry.kind.file_type(),
                entry.name,
            ) {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &FuseRequest<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino={ino} flags={flags}");

        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EACCES);
            return;
        }

        match self.context.open(Handle::from_ino(ino)) {
            // Content is rendered per read and the reported size is 0.
            Ok(()) => reply.opened(0, fuser::consts::FOPEN_DIRECT_IO),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &FuseRequest<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={ino} fh={fh} offset={offset} size={size}");

        let offset = u64::try_from(offset).unwrap_or(0);
        match self
            .context
            .read(Handle::from_ino(ino), offset, size as usize)
        {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn statfs(&mut self, _req: &FuseRequest<'_>, _ino: u64, reply: ReplyStatfs) {
        debug!("statfs");
        let files = self.context.live_items() as u64;
        let namelen = MAX_NAME_LEN as u32;
        reply.statfs(
            0,       // blocks
            0,       // bfree
            0,       // bavail
            files,   // files
            0,       // ffree
            512,     // bsize
            namelen, // namelen
            512,     // frsize
        );
    }
}
