//! Server-side buffers backing in-flight multi-part streams (`spec.md`
//! §4.3, component C3). A stream is either held entirely in memory
//! (request streams, which are small) or spilled to a temp file on disk
//! (resource streams, which can be arbitrarily large). Every buffer tracks
//! `last_activity` so the pool's periodic sweep can reap ones whose
//! receiver vanished mid-transfer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex as AsyncMutex;
use zway_proto::logging::Logger;
use zway_proto::{logging, time, Error, Result, StreamId};

use crate::packet::MAX_PACKET_BODY;

enum Backing {
    Memory(AsyncMutex<Vec<u8>>),
    File(AsyncMutex<File>, PathBuf),
}

/// A single in-flight stream's storage, shared between its receiver and
/// (once accepted) its sender.
pub struct StreamBuffer {
    id: StreamId,
    backing: Backing,
    bytes_written: AtomicU64,
    /// Set once the writer side has finished; lets a reader distinguish
    /// "no more data yet" from "no more data ever".
    total_size: SyncMutex<Option<u64>>,
    last_activity: AtomicU64,
}

impl StreamBuffer {
    fn new_memory(id: StreamId) -> StreamBuffer {
        StreamBuffer {
            id,
            backing: Backing::Memory(AsyncMutex::new(Vec::new())),
            bytes_written: AtomicU64::new(0),
            total_size: SyncMutex::new(None),
            last_activity: AtomicU64::new(time::timestamp_secs()),
        }
    }

    fn new_file(id: StreamId, file: File, path: PathBuf) -> StreamBuffer {
        StreamBuffer {
            id,
            backing: Backing::File(AsyncMutex::new(file), path),
            bytes_written: AtomicU64::new(0),
            total_size: SyncMutex::new(None),
            last_activity: AtomicU64::new(time::timestamp_secs()),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Acquire)
    }

    pub fn total_size(&self) -> Option<u64> {
        *self.total_size.lock()
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.last_activity.store(time::timestamp_secs(), Ordering::Release);
    }

    /// Append a chunk at the current write offset. Writes within a single
    /// stream always arrive in increasing part order, so this is a plain
    /// append; a stray out-of-order part would simply overwrite the
    /// matching range.
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        match &self.backing {
            Backing::Memory(buf) => {
                let mut buf = buf.lock().await;
                let end = offset as usize + data.len();
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[offset as usize..end].copy_from_slice(data);
            }
            Backing::File(file, _) => {
                let mut file = file.lock().await;
                file.seek(SeekFrom::Start(offset)).await.map_err(Error::TransportIo)?;
                file.write_all(data).await.map_err(Error::TransportIo)?;
            }
        }

        self.bytes_written.fetch_max(offset + data.len() as u64, Ordering::AcqRel);
        self.touch();
        Ok(())
    }

    /// Mark the buffer sealed at `size` bytes; no further writes will occur.
    pub fn seal(&self, size: u64) {
        *self.total_size.lock() = Some(size);
        self.touch();
    }

    /// Read up to `len` bytes starting at `offset`. Returns `None` if the
    /// requested range isn't fully written yet and the buffer isn't sealed
    /// short of it — the caller (the stream sender) should retry later.
    pub async fn read_range(&self, offset: u64, len: usize) -> Result<Option<Vec<u8>>> {
        let available = self.bytes_written();
        let sealed_at = self.total_size();

        let want_end = offset + len as u64;
        if want_end > available {
            if sealed_at.map_or(false, |end| offset >= end) {
                return Ok(Some(Vec::new()));
            }
            return Ok(None);
        }

        match &self.backing {
            Backing::Memory(buf) => {
                let buf = buf.lock().await;
                Ok(Some(buf[offset as usize..offset as usize + len].to_vec()))
            }
            Backing::File(file, _) => {
                let mut file = file.lock().await;
                file.seek(SeekFrom::Start(offset)).await.map_err(Error::TransportIo)?;
                let mut data = vec![0u8; len];
                file.read_exact(&mut data).await.map_err(Error::TransportIo)?;
                Ok(Some(data))
            }
        }
    }
}

/// Registry of live stream buffers, keyed by stream id. Request streams
/// (small, bounded) stay in memory; resource streams (attachments) spill
/// to `tmp_dir`.
pub struct StreamPool {
    buffers: SyncMutex<HashMap<StreamId, Arc<StreamBuffer>>>,
    tmp_dir: PathBuf,
    log: Logger,
}

impl StreamPool {
    pub fn new(tmp_dir: impl Into<PathBuf>, log: &Logger) -> StreamPool {
        StreamPool {
            buffers: SyncMutex::new(HashMap::new()),
            tmp_dir: tmp_dir.into(),
            log: log.new(logging::o!("component" => "stream-pool")),
        }
    }

    pub async fn create_memory(&self, id: StreamId) -> Result<Arc<StreamBuffer>> {
        let mut buffers = self.buffers.lock();
        if buffers.contains_key(&id) {
            return Err(Error::Duplicate);
        }
        let buffer = Arc::new(StreamBuffer::new_memory(id));
        buffers.insert(id, buffer.clone());
        Ok(buffer)
    }

    pub async fn create_file(&self, id: StreamId) -> Result<Arc<StreamBuffer>> {
        {
            let buffers = self.buffers.lock();
            if buffers.contains_key(&id) {
                return Err(Error::Duplicate);
            }
        }

        tokio::fs::create_dir_all(&self.tmp_dir).await.map_err(Error::TransportIo)?;
        let path = self.path_for(id);
        let file = File::create(&path).await.map_err(Error::TransportIo)?;

        let buffer = Arc::new(StreamBuffer::new_file(id, file, path));
        let mut buffers = self.buffers.lock();
        if buffers.contains_key(&id) {
            return Err(Error::Duplicate);
        }
        buffers.insert(id, buffer.clone());
        Ok(buffer)
    }

    /// Look up a live buffer, reopening it from `tmp_dir` if it was dropped
    /// from memory (e.g. reaped by an idle sweep, or after a server
    /// restart) but its backing file still exists (`spec.md` §4.3
    /// `getStreamBuffer`, §6: "read back by getStreamBuffer on future
    /// lookups"). The reopened buffer's size and part count are derived
    /// from the file's length on disk and it's sealed immediately, since a
    /// persisted file is always a completed upload.
    pub async fn get(&self, id: StreamId) -> Option<Arc<StreamBuffer>> {
        if let Some(buffer) = self.buffers.lock().get(&id).cloned() {
            return Some(buffer);
        }

        let path = self.path_for(id);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        let file = File::open(&path).await.ok()?;
        let size = metadata.len();

        let buffer = Arc::new(StreamBuffer::new_file(id, file, path));
        buffer.seal(size);
        buffer.bytes_written.fetch_max(size, Ordering::AcqRel);

        let mut buffers = self.buffers.lock();
        if let Some(existing) = buffers.get(&id).cloned() {
            return Some(existing);
        }
        buffers.insert(id, buffer.clone());
        Some(buffer)
    }

    pub fn remove(&self, id: StreamId) -> Option<Arc<StreamBuffer>> {
        let buffer = self.buffers.lock().remove(&id);
        if let Some(buffer) = &buffer {
            if let Backing::File(_, path) = &buffer.backing {
                let _ = std::fs::remove_file(path);
            }
        }
        buffer
    }

    fn path_for(&self, id: StreamId) -> PathBuf {
        Path::new(&self.tmp_dir).join(id.to_string())
    }

    /// Drop buffers idle for longer than `idle_timeout_secs` (`spec.md`
    /// §4.3: 60 second default reap interval for abandoned streams).
    pub fn reap_idle(&self, now: u64, idle_timeout_secs: u64) -> Vec<StreamId> {
        let expired: Vec<StreamId> = {
            let buffers = self.buffers.lock();
            buffers
                .iter()
                .filter(|(_, buf)| now.saturating_sub(buf.last_activity()) >= idle_timeout_secs)
                .map(|(id, _)| *id)
                .collect()
        };

        for id in &expired {
            logging::debug!(self.log, "reaping idle stream buffer"; "stream_id" => id.0);
            self.remove(*id);
        }
        expired
    }
}

/// Parts a stream of `total_bytes` splits into at [`MAX_PACKET_BODY`] per
/// part, matching the receiver's part-indexing.
pub fn parts_for_size(total_bytes: u64) -> u32 {
    if total_bytes == 0 {
        return 1;
    }
    ((total_bytes + MAX_PACKET_BODY as u64 - 1) / MAX_PACKET_BODY as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_buffer_reads_back_written_range() {
        let buffer = StreamBuffer::new_memory(StreamId(1));
        buffer.write_at(0, b"hello world").await.unwrap();

        let read = buffer.read_range(0, 5).await.unwrap();
        assert_eq!(read, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn read_beyond_written_range_returns_none_until_sealed() {
        let buffer = StreamBuffer::new_memory(StreamId(1));
        buffer.write_at(0, b"abc").await.unwrap();

        assert_eq!(buffer.read_range(0, 10).await.unwrap(), None);

        buffer.seal(3);
        assert_eq!(buffer.read_range(3, 0).await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn pool_rejects_duplicate_stream_id() {
        let pool = StreamPool::new("/tmp/zway-test-unused", &logging::discard());
        pool.create_memory(StreamId(5)).await.unwrap();
        assert!(matches!(pool.create_memory(StreamId(5)).await, Err(Error::Duplicate)));
    }

    #[test]
    fn parts_for_size_rounds_up() {
        assert_eq!(parts_for_size(0), 1);
        assert_eq!(parts_for_size(1), 1);
        assert_eq!(parts_for_size(MAX_PACKET_BODY as u64), 1);
        assert_eq!(parts_for_size(MAX_PACKET_BODY as u64 + 1), 2);
    }

    #[tokio::test]
    async fn reap_idle_removes_stale_buffers_only() {
        let pool = StreamPool::new("/tmp/zway-test-unused", &logging::discard());
        pool.create_memory(StreamId(1)).await.unwrap();

        let now = pool.get(StreamId(1)).await.unwrap().last_activity() + 120;
        let reaped = pool.reap_idle(now, 60);

        assert_eq!(reaped, vec![StreamId(1)]);
        assert!(pool.get(StreamId(1)).await.is_none());
    }
}
