/// Every directory in the tree: rwxr-xr-x.
pub const DIR_PERM: u16 = 0o755;
/// Every statistics file: read-only for everyone.
pub const FILE_PERM: u16 = 0o444;
/// Block size reported for statistics files.
pub const FILE_BLKSIZE: u32 = 4096;

/// Link count for a directory. Non-root directories report 1, which tells
/// `find` and friends not to trust the subdirectory count.
pub fn dir_nlink(is_root: bool) -> u32 {
    if is_root { 2 } else { 1 }
}
