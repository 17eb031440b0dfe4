//! In-memory tree node types.

use std::collections::BTreeMap;

use crate::stream::Stream;
use crate::vfs::mount::Mount;

pub(crate) enum Node {
    Directory(DirNode),
    File(FileNode),
}

pub(crate) struct DirNode {
    pub children: BTreeMap<String, Node>,
    pub mount: Option<Box<dyn Mount>>,
    pub read_only: bool,
}

pub(crate) struct FileNode {
    /// The file's storage IS a `Stream`: `open_write` hands out a clone
    /// of this same handle, so every `put` a writer performs lands
    /// directly in the node with no separate buffer to keep in sync.
    /// `open_read` never hands out this handle itself — it snapshots the
    /// bytes into a fresh stream so a read is a point-in-time copy.
    pub bytes: Stream,
    pub read_only: bool,
}

impl FileNode {
    pub fn new() -> Self {
        FileNode {
            bytes: Stream::new(),
            read_only: false,
        }
    }
}

impl DirNode {
    pub fn new() -> Self {
        DirNode {
            children: BTreeMap::new(),
            mount: None,
            read_only: false,
        }
    }
}

