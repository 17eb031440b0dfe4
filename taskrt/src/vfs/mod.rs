//! Hierarchical virtual filesystem: an in-memory tree with pluggable
//! mount backends attached at directory boundaries.
//!
//! The VFS is not thread-safe by specification — every operation takes
//! `&mut self` or reads through `&self`, and it is the caller's
//! responsibility (typically a single shell task ticking on `MAIN`) to
//! serialize access, same as [`crate::Runtime`]'s process table is only
//! ever mutated from the thread driving `MAIN`.

mod mount;
mod node;
mod path;

pub use mount::{Mount, NodeType};
pub use path::VfsPath;

use node::{DirNode, FileNode, Node};

use crate::error::VfsStatus;
use crate::stream::Stream;

pub struct Vfs {
    root: DirNode,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub fn new() -> Self {
        Vfs { root: DirNode::new() }
    }

    fn rel_path(segments: &[String]) -> String {
        format!("/{}", segments.join("/"))
    }

    pub fn exists(&self, path: &str) -> bool {
        !matches!(self.get_type(path), NodeType::NoExist)
    }

    pub fn get_type(&self, path: &str) -> NodeType {
        let path = match VfsPath::parse(path) {
            Ok(p) => p,
            Err(_) => return NodeType::NoExist,
        };
        if path.is_root() {
            return NodeType::MemDir;
        }
        Self::get_type_rec(&self.root, path.segments())
    }

    fn get_type_rec(dir: &DirNode, segments: &[String]) -> NodeType {
        if let Some(mount) = &dir.mount {
            return mount.get_type(&Self::rel_path(segments));
        }
        let (head, rest) = match segments.split_first() {
            Some(x) => x,
            None => return NodeType::MemDir,
        };
        match dir.children.get(head) {
            None => NodeType::NoExist,
            Some(Node::File(_)) if rest.is_empty() => NodeType::MemFile,
            Some(Node::File(_)) => NodeType::NoExist,
            Some(Node::Directory(d)) if rest.is_empty() => {
                if d.mount.is_some() {
                    NodeType::MountDir
                } else {
                    NodeType::MemDir
                }
            }
            Some(Node::Directory(d)) => Self::get_type_rec(d, rest),
        }
    }

    pub fn mkdir(&mut self, path: &str) -> VfsStatus {
        let p = match VfsPath::parse(path) {
            Ok(p) => p,
            Err(_) => return VfsStatus::DoesNotExist,
        };
        if p.is_root() {
            return VfsStatus::Exists;
        }
        Self::mkdir_rec(&mut self.root, p.segments())
    }

    fn mkdir_rec(dir: &mut DirNode, segments: &[String]) -> VfsStatus {
        if let Some(mount) = &mut dir.mount {
            if mount.is_read_only() {
                return VfsStatus::ReadOnly;
            }
            return mount.mkdir(&Self::rel_path(segments));
        }
        if dir.read_only {
            return VfsStatus::ReadOnly;
        }
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            if dir.children.contains_key(head) {
                return VfsStatus::Exists;
            }
            dir.children.insert(head.clone(), Node::Directory(DirNode::new()));
            return VfsStatus::Ok;
        }
        match dir.children.get_mut(head) {
            None => VfsStatus::ParentDoesNotExist,
            Some(Node::File(_)) => VfsStatus::NotDirectory,
            Some(Node::Directory(d)) => Self::mkdir_rec(d, rest),
        }
    }

    pub fn mkfile(&mut self, path: &str) -> VfsStatus {
        let p = match VfsPath::parse(path) {
            Ok(p) => p,
            Err(_) => return VfsStatus::DoesNotExist,
        };
        if p.is_root() {
            return VfsStatus::Exists;
        }
        Self::mkfile_rec(&mut self.root, p.segments())
    }

    fn mkfile_rec(dir: &mut DirNode, segments: &[String]) -> VfsStatus {
        if let Some(mount) = &mut dir.mount {
            if mount.is_read_only() {
                return VfsStatus::ReadOnly;
            }
            return mount.mkfile(&Self::rel_path(segments));
        }
        if dir.read_only {
            return VfsStatus::ReadOnly;
        }
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            if dir.children.contains_key(head) {
                return VfsStatus::Exists;
            }
            dir.children.insert(head.clone(), Node::File(FileNode::new()));
            return VfsStatus::Ok;
        }
        match dir.children.get_mut(head) {
            None => VfsStatus::ParentDoesNotExist,
            Some(Node::File(_)) => VfsStatus::NotDirectory,
            Some(Node::Directory(d)) => Self::mkfile_rec(d, rest),
        }
    }

    pub fn remove(&mut self, path: &str) -> VfsStatus {
        let p = match VfsPath::parse(path) {
            Ok(p) => p,
            Err(_) => return VfsStatus::DoesNotExist,
        };
        if p.is_root() {
            return VfsStatus::ReadOnly;
        }
        Self::remove_rec(&mut self.root, p.segments())
    }

    fn remove_rec(dir: &mut DirNode, segments: &[String]) -> VfsStatus {
        if let Some(mount) = &mut dir.mount {
            return mount.remove(&Self::rel_path(segments));
        }
        if dir.read_only {
            return VfsStatus::ReadOnly;
        }
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            match dir.children.get(head) {
                None => VfsStatus::DoesNotExist,
                Some(Node::Directory(d)) if d.mount.is_some() => VfsStatus::IsMounted,
                Some(Node::Directory(d)) if !d.children.is_empty() => VfsStatus::NotEmpty,
                Some(_) => {
                    dir.children.remove(head);
                    VfsStatus::Ok
                }
            }
        } else {
            match dir.children.get_mut(head) {
                None => VfsStatus::ParentDoesNotExist,
                Some(Node::File(_)) => VfsStatus::NotDirectory,
                Some(Node::Directory(d)) => Self::remove_rec(d, rest),
            }
        }
    }

    /// Opens `path` for reading: a point-in-time snapshot of the file's
    /// bytes, already at EOF once drained.
    pub fn open_read(&self, path: &str) -> Option<Stream> {
        let p = VfsPath::parse(path).ok()?;
        if p.is_root() {
            return None;
        }
        Self::open_read_rec(&self.root, p.segments())
    }

    fn open_read_rec(dir: &DirNode, segments: &[String]) -> Option<Stream> {
        if let Some(mount) = &dir.mount {
            return mount.open_read(&Self::rel_path(segments));
        }
        let (head, rest) = segments.split_first()?;
        match dir.children.get(head) {
            Some(Node::File(f)) if rest.is_empty() => Some(Stream::from_bytes(f.bytes.snapshot_bytes())),
            Some(Node::Directory(d)) if !rest.is_empty() => Self::open_read_rec(d, rest),
            _ => None,
        }
    }

    /// Opens `path` for writing. The returned stream shares storage with
    /// the node directly: every `put` is immediately visible to a
    /// subsequent `open_read`. Creates the file if it does not already
    /// exist, same as a POSIX `open(..., O_CREAT)`. With `append = false`
    /// the file's existing bytes are discarded first.
    pub fn open_write(&mut self, path: &str, append: bool) -> Option<Stream> {
        let p = VfsPath::parse(path).ok()?;
        if p.is_root() {
            return None;
        }
        Self::open_write_rec(&mut self.root, p.segments(), append)
    }

    fn open_write_rec(dir: &mut DirNode, segments: &[String], append: bool) -> Option<Stream> {
        if let Some(mount) = &mut dir.mount {
            return mount.open_write(&Self::rel_path(segments), append);
        }
        if dir.read_only {
            return None;
        }
        let (head, rest) = segments.split_first()?;
        if rest.is_empty() {
            if !dir.children.contains_key(head) {
                dir.children.insert(head.clone(), Node::File(FileNode::new()));
            }
            return match dir.children.get_mut(head) {
                Some(Node::File(f)) => {
                    if f.read_only {
                        return None;
                    }
                    if !append {
                        f.bytes = Stream::new();
                    }
                    Some(f.bytes.clone())
                }
                _ => None,
            };
        }
        match dir.children.get_mut(head) {
            Some(Node::Directory(d)) => Self::open_write_rec(d, rest, append),
            _ => None,
        }
    }

    pub fn list_dir(&self, path: &str) -> Option<Vec<String>> {
        let p = VfsPath::parse(path).ok()?;
        Self::list_dir_rec(&self.root, p.segments())
    }

    fn list_dir_rec(dir: &DirNode, segments: &[String]) -> Option<Vec<String>> {
        if let Some(mount) = &dir.mount {
            return Some(mount.list_dir(&Self::rel_path(segments)));
        }
        let (head, rest) = match segments.split_first() {
            Some(x) => x,
            None => return Some(dir.children.keys().cloned().collect()),
        };
        match dir.children.get(head) {
            Some(Node::Directory(d)) => Self::list_dir_rec(d, rest),
            _ => None,
        }
    }

    pub fn set_read_only(&mut self, path: &str, read_only: bool) -> VfsStatus {
        let p = match VfsPath::parse(path) {
            Ok(p) => p,
            Err(_) => return VfsStatus::DoesNotExist,
        };
        if p.is_root() {
            self.root.read_only = read_only;
            return VfsStatus::Ok;
        }
        Self::set_read_only_rec(&mut self.root, p.segments(), read_only)
    }

    fn set_read_only_rec(dir: &mut DirNode, segments: &[String], read_only: bool) -> VfsStatus {
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            match dir.children.get_mut(head) {
                None => VfsStatus::DoesNotExist,
                Some(Node::Directory(d)) if d.mount.is_some() => VfsStatus::IsMounted,
                Some(Node::Directory(d)) => {
                    d.read_only = read_only;
                    VfsStatus::Ok
                }
                Some(Node::File(f)) => {
                    f.read_only = read_only;
                    VfsStatus::Ok
                }
            }
        } else {
            match dir.children.get_mut(head) {
                None => VfsStatus::ParentDoesNotExist,
                Some(Node::File(_)) => VfsStatus::NotDirectory,
                Some(Node::Directory(d)) => Self::set_read_only_rec(d, rest, read_only),
            }
        }
    }

    /// Attaches `backend` at `path`, which must already be an empty,
    /// un-mounted directory.
    pub fn mount(&mut self, path: &str, backend: Box<dyn Mount>) -> VfsStatus {
        let p = match VfsPath::parse(path) {
            Ok(p) => p,
            Err(_) => return VfsStatus::DoesNotExist,
        };
        if p.is_root() {
            if self.root.mount.is_some() {
                return VfsStatus::IsMounted;
            }
            if !self.root.children.is_empty() {
                return VfsStatus::NotEmpty;
            }
            self.root.mount = Some(backend);
            return VfsStatus::Ok;
        }
        Self::mount_rec(&mut self.root, p.segments(), backend)
    }

    fn mount_rec(dir: &mut DirNode, segments: &[String], backend: Box<dyn Mount>) -> VfsStatus {
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            match dir.children.get_mut(head) {
                None => VfsStatus::DoesNotExist,
                Some(Node::File(_)) => VfsStatus::NotDirectory,
                Some(Node::Directory(d)) => {
                    if d.mount.is_some() {
                        return VfsStatus::IsMounted;
                    }
                    if !d.children.is_empty() {
                        return VfsStatus::NotEmpty;
                    }
                    d.mount = Some(backend);
                    VfsStatus::Ok
                }
            }
        } else {
            match dir.children.get_mut(head) {
                None => VfsStatus::ParentDoesNotExist,
                Some(Node::File(_)) => VfsStatus::NotDirectory,
                Some(Node::Directory(d)) => Self::mount_rec(d, rest, backend),
            }
        }
    }

    pub fn unmount(&mut self, path: &str) -> VfsStatus {
        let p = match VfsPath::parse(path) {
            Ok(p) => p,
            Err(_) => return VfsStatus::DoesNotExist,
        };
        if p.is_root() {
            return match self.root.mount.take() {
                Some(_) => VfsStatus::Ok,
                None => VfsStatus::DoesNotExist,
            };
        }
        Self::unmount_rec(&mut self.root, p.segments())
    }

    fn unmount_rec(dir: &mut DirNode, segments: &[String]) -> VfsStatus {
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            match dir.children.get_mut(head) {
                Some(Node::Directory(d)) => match d.mount.take() {
                    Some(_) => VfsStatus::Ok,
                    None => VfsStatus::DoesNotExist,
                },
                _ => VfsStatus::DoesNotExist,
            }
        } else {
            match dir.children.get_mut(head) {
                None => VfsStatus::ParentDoesNotExist,
                Some(Node::File(_)) => VfsStatus::NotDirectory,
                Some(Node::Directory(d)) => Self::unmount_rec(d, rest),
            }
        }
    }

    /// If `dst` names an existing directory, resolves to `dst` joined with
    /// `src`'s own file name; otherwise resolves to `dst` itself.
    fn resolve_destination(&self, src: &str, dst: &str) -> Option<VfsPath> {
        let dst_path = VfsPath::parse(dst).ok()?;
        if matches!(self.get_type(dst), NodeType::MemDir | NodeType::MountDir) {
            let src_path = VfsPath::parse(src).ok()?;
            let name = src_path.file_name()?;
            Some(dst_path.join(name))
        } else {
            Some(dst_path)
        }
    }

    /// Copies the bytes at `src` to `dst`. If `dst` names an existing
    /// directory, the copy lands inside it under `src`'s own file name.
    pub fn copy(&mut self, src: &str, dst: &str) -> VfsStatus {
        let reader = match self.open_read(src) {
            Some(s) => s,
            None => return VfsStatus::DoesNotExist,
        };
        let bytes = reader.snapshot_bytes();

        let real_dst = match self.resolve_destination(src, dst) {
            Some(p) => p,
            None => return VfsStatus::DoesNotExist,
        };

        match self.open_write(&real_dst.to_string_lossy(), false) {
            Some(writer) => {
                writer.put_bytes(&bytes);
                VfsStatus::Ok
            }
            None => VfsStatus::ReadOnly,
        }
    }

    /// True if every directory from the root down to (but not including)
    /// the final path component is a plain in-memory directory, i.e. the
    /// path never crosses a mount boundary on the way to its parent.
    fn parent_chain_in_memory(dir: &DirNode, segments: &[String]) -> bool {
        if dir.mount.is_some() {
            return false;
        }
        let (head, rest) = match segments.split_first() {
            Some(x) => x,
            None => return true,
        };
        if rest.is_empty() {
            return true;
        }
        match dir.children.get(head) {
            Some(Node::Directory(d)) => Self::parent_chain_in_memory(d, rest),
            _ => true,
        }
    }

    /// Removes and returns the node named by the final segment of
    /// `segments`, for a path already known to stay in-memory.
    fn take_node_rec(dir: &mut DirNode, segments: &[String]) -> Result<Node, VfsStatus> {
        if dir.read_only {
            return Err(VfsStatus::ReadOnly);
        }
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            return match dir.children.get(head) {
                None => Err(VfsStatus::DoesNotExist),
                Some(Node::Directory(d)) if !d.children.is_empty() => Err(VfsStatus::NotEmpty),
                Some(_) => Ok(dir.children.remove(head).expect("just checked present")),
            };
        }
        match dir.children.get_mut(head) {
            None => Err(VfsStatus::ParentDoesNotExist),
            Some(Node::File(_)) => Err(VfsStatus::NotDirectory),
            Some(Node::Directory(d)) => Self::take_node_rec(d, rest),
        }
    }

    /// Inserts `node` under the final segment of `segments`. On failure,
    /// hands `node` back so the caller can restore it to where it came
    /// from instead of losing it.
    fn insert_node_rec(dir: &mut DirNode, segments: &[String], node: Node) -> Result<(), (VfsStatus, Node)> {
        if dir.read_only {
            return Err((VfsStatus::ReadOnly, node));
        }
        let (head, rest) = segments.split_first().expect("non-empty path");
        if rest.is_empty() {
            if dir.children.contains_key(head) {
                return Err((VfsStatus::Exists, node));
            }
            dir.children.insert(head.clone(), node);
            return Ok(());
        }
        match dir.children.get_mut(head) {
            None => Err((VfsStatus::ParentDoesNotExist, node)),
            Some(Node::File(_)) => Err((VfsStatus::NotDirectory, node)),
            Some(Node::Directory(d)) => Self::insert_node_rec(d, rest, node),
        }
    }

    /// Moves `src` to `dst`. When both ends are plain in-memory nodes this
    /// is a pointer re-parent: the node is removed from the source
    /// directory's map and inserted unchanged into the destination's, so
    /// a write-stream handle a caller already holds on the file keeps
    /// writing into the moved file rather than an orphaned copy. Crossing
    /// a mount boundary on either side falls back to copy-then-remove,
    /// since a mount backend owns its bytes independently of this tree.
    pub fn move_(&mut self, src: &str, dst: &str) -> VfsStatus {
        let src_path = match VfsPath::parse(src) {
            Ok(p) => p,
            Err(_) => return VfsStatus::DoesNotExist,
        };
        if src_path.is_root() {
            return VfsStatus::ReadOnly;
        }
        let real_dst = match self.resolve_destination(src, dst) {
            Some(p) => p,
            None => return VfsStatus::DoesNotExist,
        };
        if real_dst.is_root() {
            return VfsStatus::ReadOnly;
        }

        let src_in_memory = matches!(self.get_type(src), NodeType::MemFile | NodeType::MemDir)
            && Self::parent_chain_in_memory(&self.root, src_path.segments());
        let dst_in_memory = Self::parent_chain_in_memory(&self.root, real_dst.segments());

        if src_in_memory && dst_in_memory {
            return match Self::take_node_rec(&mut self.root, src_path.segments()) {
                Ok(node) => match Self::insert_node_rec(&mut self.root, real_dst.segments(), node) {
                    Ok(()) => VfsStatus::Ok,
                    Err((status, node)) => {
                        // insertion failed: put the node back where it came from
                        // rather than losing it.
                        let _ = Self::insert_node_rec(&mut self.root, src_path.segments(), node);
                        status
                    }
                },
                Err(status) => status,
            };
        }

        let status = self.copy(src, &real_dst.to_string_lossy());
        if !status.is_ok() {
            return status;
        }
        self.remove(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdir_then_mkfile_then_read_write_round_trip() {
        let mut vfs = Vfs::new();
        assert_eq!(vfs.mkdir("/a"), VfsStatus::Ok);
        assert_eq!(vfs.mkdir("/a"), VfsStatus::Exists);
        assert_eq!(vfs.mkfile("/a/f"), VfsStatus::Ok);

        let w = vfs.open_write("/a/f", false).unwrap();
        w.put_bytes(b"hello");
        drop(w);

        let r = vfs.open_read("/a/f").unwrap();
        assert_eq!(r.snapshot_bytes(), b"hello");
    }

    #[test]
    fn remove_restores_non_existence() {
        let mut vfs = Vfs::new();
        vfs.mkfile("/f");
        assert!(vfs.exists("/f"));
        assert_eq!(vfs.remove("/f"), VfsStatus::Ok);
        assert!(!vfs.exists("/f"));
    }

    #[test]
    fn remove_nonempty_directory_fails() {
        let mut vfs = Vfs::new();
        vfs.mkdir("/d");
        vfs.mkfile("/d/f");
        assert_eq!(vfs.remove("/d"), VfsStatus::NotEmpty);
    }

    #[test]
    fn copy_into_directory_uses_source_file_name() {
        let mut vfs = Vfs::new();
        vfs.mkfile("/src");
        vfs.open_write("/src", false).unwrap().put_bytes(b"xyz");
        vfs.mkdir("/dst");
        assert_eq!(vfs.copy("/src", "/dst"), VfsStatus::Ok);
        assert_eq!(vfs.open_read("/dst/src").unwrap().snapshot_bytes(), b"xyz");
    }
}
