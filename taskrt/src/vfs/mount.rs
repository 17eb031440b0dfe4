//! The pluggable backend interface attached at a directory boundary.

use std::fmt;

use crate::error::VfsStatus;
use crate::stream::Stream;

/// Node classification as seen from outside: whether storage lives in
/// the in-memory tree or is delegated to a mounted backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    MemFile,
    MemDir,
    MountFile,
    MountDir,
    NoExist,
}

/// Everything the VFS needs from a storage backend attached at a mount
/// point. Paths passed to a `Mount` are relative to the mount's root
/// (the leading segments up to and including the mount point are
/// already stripped by [`crate::vfs::Vfs`]).
pub trait Mount: fmt::Debug + Send {
    fn is_read_only(&self) -> bool;
    fn get_type(&self, path: &str) -> NodeType;
    fn mkdir(&mut self, path: &str) -> VfsStatus;
    fn mkfile(&mut self, path: &str) -> VfsStatus;
    fn remove(&mut self, path: &str) -> VfsStatus;
    fn open_read(&self, path: &str) -> Option<Stream>;
    fn open_write(&mut self, path: &str, append: bool) -> Option<Stream>;
    fn list_dir(&self, path: &str) -> Vec<String>;

    fn exists(&self, path: &str) -> bool {
        !matches!(self.get_type(path), NodeType::NoExist)
    }
}
