//! FUSE adapter: translates kernel filesystem requests into [`RemoteFs`]
//! calls.
//!
//! The adapter keeps an inode-to-path table (the engine is path-addressed,
//! the kernel speaks inodes) and a table of open handles, each of which holds
//! the advisory lock taken at open time. The engine only moves whole files,
//! so reads slice the full content and partial writes are assembled
//! read-modify-write with zero padding.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use fuser::{
    FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use tracing::{Instrument as _, debug, debug_span};

use crate::error::FsError;
use crate::model::{FileInfo, LockType};
use crate::remote::RemoteFs;

/// Kernel-side cache TTL for entries and attributes.
const ATTR_TTL: Duration = Duration::from_secs(1);

const ROOT_INO: u64 = 1;
const BLOCK_SIZE: u32 = 4096;

#[derive(Debug, Clone)]
struct Node {
    path: String,
    is_dir: bool,
    /// Last `FileInfo` observed for a file node. Directories synthesize
    /// their attributes instead.
    info: Option<FileInfo>,
}

#[derive(Debug)]
struct NodeTable {
    nodes: HashMap<u64, Node>,
    by_path: HashMap<String, u64>,
    next_ino: u64,
}

impl NodeTable {
    fn new() -> Self {
        let mut table = Self {
            nodes: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.nodes.insert(
            ROOT_INO,
            Node {
                path: "/".to_owned(),
                is_dir: true,
                info: None,
            },
        );
        table.by_path.insert("/".to_owned(), ROOT_INO);
        table
    }

    fn get(&self, ino: u64) -> Option<Node> {
        self.nodes.get(&ino).cloned()
    }

    /// Register `path` (or refresh an existing registration) and return its
    /// inode number.
    fn upsert(&mut self, path: &str, is_dir: bool, info: Option<FileInfo>) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.is_dir = is_dir;
                if info.is_some() {
                    node.info = info;
                }
            }
            return ino;
        }

        let ino = self.next_ino;
        self.next_ino += 1;
        self.nodes.insert(
            ino,
            Node {
                path: path.to_owned(),
                is_dir,
                info,
            },
        );
        self.by_path.insert(path.to_owned(), ino);
        ino
    }

    fn update_info(&mut self, ino: u64, info: FileInfo) {
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.info = Some(info);
        }
    }

    /// Refresh the cached size (and mtime) of a file node after a write.
    fn set_file_size(&mut self, path: &str, size: u64) {
        if let Some(&ino) = self.by_path.get(path) {
            if let Some(info) = self.nodes.get_mut(&ino).and_then(|n| n.info.as_mut()) {
                info.size = size;
                info.mod_time = SystemTime::now();
            }
        }
    }
}

/// Per-open-file state. The lock taken at open time is released exactly once
/// in `release`, on every exit path.
#[derive(Debug, Clone)]
struct OpenHandle {
    path: String,
    lock_type: LockType,
    mode: u32,
    size: u64,
}

struct AdapterState {
    nodes: Mutex<NodeTable>,
    handles: Mutex<HashMap<u64, OpenHandle>>,
    next_fh: AtomicU64,
    uid: u32,
    gid: u32,
    pid: u32,
}

/// `fuser::Filesystem` implementation over any [`RemoteFs`] client.
///
/// Each kernel request is served on its own task spawned onto the captured
/// runtime handle, so concurrency mirrors the kernel's in-flight requests.
pub struct RemoteFsAdapter<C: RemoteFs> {
    client: Arc<C>,
    runtime: tokio::runtime::Handle,
    state: Arc<AdapterState>,
}

impl<C: RemoteFs> RemoteFsAdapter<C> {
    pub fn new(client: C, runtime: tokio::runtime::Handle) -> Self {
        Self {
            client: Arc::new(client),
            runtime,
            state: Arc::new(AdapterState {
                nodes: Mutex::new(NodeTable::new()),
                handles: Mutex::new(HashMap::new()),
                next_fh: AtomicU64::new(1),
                uid: nix::unistd::Uid::current().as_raw(),
                gid: nix::unistd::Gid::current().as_raw(),
                pid: std::process::id(),
            }),
        }
    }

    fn spawn<Fut>(
        &self,
        span: tracing::Span,
        f: impl FnOnce(Arc<C>, Arc<AdapterState>) -> Fut + Send + 'static,
    ) where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        self.runtime.spawn(f(client, state).instrument(span));
    }
}

fn lock_mutex<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Join a child name onto a parent path. `None` for names that would break
/// path-as-identity (non-UTF-8, empty, dot entries, embedded slashes).
fn join_path(parent: &str, name: &OsStr) -> Option<String> {
    let name = name.to_str()?;
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return None;
    }
    if parent == "/" {
        Some(format!("/{name}"))
    } else {
        Some(format!("{parent}/{name}"))
    }
}

/// Map an open's access mode onto the lock taken for the handle's lifetime.
fn lock_type_for_flags(flags: i32) -> LockType {
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => LockType::Write,
        libc::O_RDWR => LockType::Exclusive,
        _ => LockType::Read,
    }
}

/// Read-modify-write assembly for partial writes: zero-pad out to `offset`
/// if the file is shorter, extend as needed, overwrite in place.
fn splice_at(mut current: Vec<u8>, offset: usize, data: &[u8]) -> Vec<u8> {
    let end = offset.saturating_add(data.len());
    if current.len() < end {
        current.resize(end, 0);
    }
    current[offset..end].copy_from_slice(data);
    current
}

/// Offset/size slicing over whole-file content; empty past EOF.
fn slice_range(content: &[u8], offset: usize, size: u32) -> &[u8] {
    if offset >= content.len() {
        return &[];
    }
    let end = offset.saturating_add(size as usize).min(content.len());
    &content[offset..end]
}

fn dir_attr(state: &AdapterState, ino: u64) -> fuser::FileAttr {
    let now = SystemTime::now();
    fuser::FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Directory,
        perm: 0o755,
        nlink: 2,
        uid: state.uid,
        gid: state.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn file_attr(state: &AdapterState, ino: u64, info: &FileInfo) -> fuser::FileAttr {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "perm is masked to the low 12 bits"
    )]
    let perm = (info.mode & 0o7777) as u16;
    fuser::FileAttr {
        ino,
        size: info.size,
        blocks: info.size.div_ceil(512),
        atime: info.mod_time,
        mtime: info.mod_time,
        ctime: info.mod_time,
        crtime: info.mod_time,
        kind: FileType::RegularFile,
        perm,
        nlink: 1,
        uid: state.uid,
        gid: state.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

impl<C: RemoteFs> fuser::Filesystem for RemoteFsAdapter<C> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_owned();
        let span = debug_span!("RemoteFsAdapter::lookup", parent, ?name);
        self.spawn(span, move |client, state| async move {
            let Some(parent_node) = lock_mutex(&state.nodes).get(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            let Some(path) = join_path(&parent_node.path, &name) else {
                reply.error(libc::ENOENT);
                return;
            };

            match client.info(&path).await {
                Ok(info) => {
                    let is_dir = info.is_dir;
                    let attr = {
                        let mut nodes = lock_mutex(&state.nodes);
                        let ino = nodes.upsert(&path, is_dir, (!is_dir).then(|| info.clone()));
                        if is_dir {
                            dir_attr(&state, ino)
                        } else {
                            file_attr(&state, ino, &info)
                        }
                    };
                    debug!(ino = attr.ino, "replying entry");
                    reply.entry(&ATTR_TTL, &attr, 0);
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.errno());
                }
            }
        });
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let span = debug_span!("RemoteFsAdapter::getattr", ino);
        self.spawn(span, move |client, state| async move {
            let Some(node) = lock_mutex(&state.nodes).get(ino) else {
                reply.error(libc::ENOENT);
                return;
            };

            if node.is_dir {
                reply.attr(&ATTR_TTL, &dir_attr(&state, ino));
                return;
            }

            let info = match node.info {
                Some(info) => info,
                None => match client.info(&node.path).await {
                    Ok(info) => {
                        lock_mutex(&state.nodes).update_info(ino, info.clone());
                        info
                    }
                    Err(e) => {
                        debug!(error = %e, "replying error");
                        reply.error(e.errno());
                        return;
                    }
                },
            };
            reply.attr(&ATTR_TTL, &file_attr(&state, ino, &info));
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let span = debug_span!("RemoteFsAdapter::readdir", ino, offset);
        self.spawn(span, move |client, state| async move {
            let Some(node) = lock_mutex(&state.nodes).get(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            if !node.is_dir {
                reply.error(libc::ENOTDIR);
                return;
            }

            let entries = match client.list(&node.path).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.errno());
                    return;
                }
            };

            // Register children so the kernel sees stable inode numbers.
            let dirents: Vec<(u64, FileType, String)> = {
                let mut nodes = lock_mutex(&state.nodes);
                entries
                    .iter()
                    .filter_map(|entry| {
                        let child_path = join_path(&node.path, OsStr::new(&entry.name))?;
                        let child_ino = nodes.upsert(
                            &child_path,
                            entry.is_dir,
                            (!entry.is_dir).then(|| entry.clone()),
                        );
                        let kind = if entry.is_dir {
                            FileType::Directory
                        } else {
                            FileType::RegularFile
                        };
                        Some((child_ino, kind, entry.name.clone()))
                    })
                    .collect()
            };

            let skip = usize::try_from(offset).unwrap_or(0);
            for (i, (child_ino, kind, name)) in dirents.iter().enumerate().skip(skip) {
                let Ok(next) = i64::try_from(i + 1) else {
                    break;
                };
                if reply.add(*child_ino, next, *kind, name) {
                    break;
                }
            }
            reply.ok();
        });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let span = debug_span!("RemoteFsAdapter::open", ino, flags);
        self.spawn(span, move |client, state| async move {
            let Some(node) = lock_mutex(&state.nodes).get(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            if node.is_dir {
                reply.error(libc::EISDIR);
                return;
            }

            let lock_type = lock_type_for_flags(flags);
            match client.lock(&node.path, lock_type, state.pid).await {
                Ok(()) => {
                    let fh = state.next_fh.fetch_add(1, Ordering::Relaxed);
                    let (mode, size) = node
                        .info
                        .as_ref()
                        .map_or((0o644, 0), |i| (i.mode, i.size));
                    lock_mutex(&state.handles).insert(
                        fh,
                        OpenHandle {
                            path: node.path,
                            lock_type,
                            mode,
                            size,
                        },
                    );
                    debug!(fh, ?lock_type, "opened");
                    reply.opened(fh, 0);
                }
                Err(e) => {
                    debug!(error = %e, "lock refused");
                    reply.error(libc::EACCES);
                }
            }
        });
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let span = debug_span!("RemoteFsAdapter::release", ino, fh);
        self.spawn(span, move |client, state| async move {
            let Some(handle) = lock_mutex(&state.handles).remove(&fh) else {
                reply.error(libc::EBADF);
                return;
            };

            match client.unlock(&handle.path, state.pid).await {
                Ok(()) => reply.ok(),
                // A coalesced read acquirer owns nothing; its release is a
                // no-op rather than a failure.
                Err(FsError::NotLocked | FsError::NotOwner) => reply.ok(),
                Err(e) => {
                    debug!(error = %e, lock_type = ?handle.lock_type, "unlock failed");
                    reply.error(libc::EACCES);
                }
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let span = debug_span!("RemoteFsAdapter::read", ino, fh, offset, size);
        self.spawn(span, move |client, state| async move {
            let Some(handle) = lock_mutex(&state.handles).get(&fh).cloned() else {
                reply.error(libc::EBADF);
                return;
            };

            match client.read(&handle.path).await {
                Ok(content) => {
                    let offset = usize::try_from(offset).unwrap_or(0);
                    let data = slice_range(&content, offset, size);
                    debug!(read_bytes = data.len(), "replying data");
                    reply.data(data);
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.errno());
                }
            }
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let data = data.to_vec();
        let span = debug_span!("RemoteFsAdapter::write", ino, fh, offset, len = data.len());
        self.spawn(span, move |client, state| async move {
            let Some(handle) = lock_mutex(&state.handles).get(&fh).cloned() else {
                reply.error(libc::EBADF);
                return;
            };

            // The engine moves whole files, so partial writes are emulated
            // read-modify-write.
            let current = match client.read(&handle.path).await {
                Ok(content) => content,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.errno());
                    return;
                }
            };

            let offset = usize::try_from(offset).unwrap_or(0);
            let assembled = splice_at(current, offset, &data);
            let new_size = assembled.len() as u64;

            match client.write(&handle.path, &assembled, handle.mode).await {
                Ok(()) => {
                    if let Some(h) = lock_mutex(&state.handles).get_mut(&fh) {
                        h.size = new_size;
                    }
                    lock_mutex(&state.nodes).set_file_size(&handle.path, new_size);
                    let written = u32::try_from(data.len()).unwrap_or(u32::MAX);
                    debug!(written, "replying written");
                    reply.written(written);
                }
                Err(e) => {
                    debug!(error = %e, "replying error");
                    reply.error(e.errno());
                }
            }
        });
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let name = name.to_owned();
        let span = debug_span!("RemoteFsAdapter::create", parent, ?name);
        self.spawn(span, move |client, state| async move {
            let Some(parent_node) = lock_mutex(&state.nodes).get(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            let Some(path) = join_path(&parent_node.path, &name) else {
                reply.error(libc::EINVAL);
                return;
            };

            let mode = mode & !umask;
            if let Err(e) = client.write(&path, &[], mode).await {
                debug!(error = %e, "replying error");
                reply.error(e.errno());
                return;
            }

            let info = FileInfo {
                name: name.to_string_lossy().into_owned(),
                size: 0,
                mode,
                mod_time: SystemTime::now(),
                is_dir: false,
                content: None,
            };
            let ino = lock_mutex(&state.nodes).upsert(&path, false, Some(info.clone()));

            let lock_type = lock_type_for_flags(flags);
            match client.lock(&path, lock_type, state.pid).await {
                Ok(()) => {
                    let fh = state.next_fh.fetch_add(1, Ordering::Relaxed);
                    lock_mutex(&state.handles).insert(
                        fh,
                        OpenHandle {
                            path,
                            lock_type,
                            mode,
                            size: 0,
                        },
                    );
                    reply.created(&ATTR_TTL, &file_attr(&state, ino, &info), 0, fh, 0);
                }
                Err(e) => {
                    debug!(error = %e, "lock refused");
                    reply.error(libc::EACCES);
                }
            }
        });
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let span = debug_span!("RemoteFsAdapter::setattr", ino, ?mode, ?size);
        self.spawn(span, move |client, state| async move {
            let Some(node) = lock_mutex(&state.nodes).get(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            if node.is_dir {
                reply.attr(&ATTR_TTL, &dir_attr(&state, ino));
                return;
            }

            let mut info = match node.info {
                Some(info) => info,
                None => match client.info(&node.path).await {
                    Ok(info) => info,
                    Err(e) => {
                        reply.error(e.errno());
                        return;
                    }
                },
            };

            if let Some(new_mode) = mode {
                let content = match client.read(&node.path).await {
                    Ok(content) => content,
                    Err(e) if e.is_not_found() => Vec::new(),
                    Err(e) => {
                        reply.error(e.errno());
                        return;
                    }
                };
                if let Err(e) = client.write(&node.path, &content, new_mode).await {
                    reply.error(e.errno());
                    return;
                }
                info.mode = new_mode;
            }

            if let Some(new_size) = size {
                let truncated = vec![0u8; usize::try_from(new_size).unwrap_or(0)];
                if let Err(e) = client.write(&node.path, &truncated, info.mode).await {
                    reply.error(e.errno());
                    return;
                }
                info.size = new_size;
            }

            info.mod_time = SystemTime::now();
            lock_mutex(&state.nodes).update_info(ino, info.clone());
            reply.attr(&ATTR_TTL, &file_attr(&state, ino, &info));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_type_follows_access_mode() {
        assert_eq!(lock_type_for_flags(libc::O_RDONLY), LockType::Read);
        assert_eq!(lock_type_for_flags(libc::O_WRONLY), LockType::Write);
        assert_eq!(lock_type_for_flags(libc::O_RDWR), LockType::Exclusive);
        assert_eq!(
            lock_type_for_flags(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC),
            LockType::Write,
            "creation flags must not change the derived lock"
        );
    }

    #[test]
    fn join_path_handles_root_and_nested_parents() {
        assert_eq!(join_path("/", OsStr::new("a")).as_deref(), Some("/a"));
        assert_eq!(join_path("/a", OsStr::new("b")).as_deref(), Some("/a/b"));
    }

    #[test]
    fn join_path_rejects_traversal_components() {
        for bad in [".", "..", "", "a/b"] {
            assert_eq!(join_path("/x", OsStr::new(bad)), None, "{bad:?}");
        }
    }

    #[test]
    fn splice_overwrites_in_place() {
        let out = splice_at(b"hello".to_vec(), 2, b"XX");
        assert_eq!(out, b"heXXo");
    }

    #[test]
    fn splice_zero_pads_past_eof() {
        let out = splice_at(b"heXXo".to_vec(), 10, b"!");
        assert_eq!(out, b"heXXo\0\0\0\0\0!");
        assert_eq!(out.len(), 11);
    }

    #[test]
    fn splice_extends_when_write_crosses_eof() {
        let out = splice_at(b"abc".to_vec(), 2, b"defg");
        assert_eq!(out, b"abdefg");
    }

    #[test]
    fn splice_is_idempotent() {
        let once = splice_at(b"hello".to_vec(), 2, b"XX");
        let twice = splice_at(once.clone(), 2, b"XX");
        assert_eq!(once, twice, "identical writes must produce identical files");
    }

    #[test]
    fn slice_range_is_empty_past_eof() {
        assert_eq!(slice_range(b"hello", 5, 10), b"");
        assert_eq!(slice_range(b"hello", 100, 1), b"");
    }

    #[test]
    fn slice_range_clamps_to_eof() {
        assert_eq!(slice_range(b"hello", 2, 100), b"llo");
        assert_eq!(slice_range(b"hello", 0, 2), b"he");
    }

    #[test]
    fn node_table_reuses_inodes_per_path() {
        let mut table = NodeTable::new();
        let a = table.upsert("/a", false, None);
        let again = table.upsert("/a", false, None);
        let b = table.upsert("/b", false, None);

        assert_eq!(a, again, "same path must map to the same inode");
        assert_ne!(a, b);
        assert_ne!(a, ROOT_INO);
    }
}
