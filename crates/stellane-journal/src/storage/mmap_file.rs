//! Memory-mapped append-only journal segments with periodic msync, the
//! default concrete storage backend (spec §4.4's first candidate
//! mechanism). Log-structured: a state transition is never an in-place
//! rewrite, it's a fresh append of the entry in its new state, so the most
//! recently written record for a trace id always wins after a crash.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use memmap2::MmapMut;
use parking_lot::Mutex;
use stellane_types::{JournalEntry, JournalRotationSection, JournalState, TraceId};

use super::JournalStorage;
use crate::error::{JournalError, Result};
use crate::wire;

struct Segment {
    index: u64,
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    cursor: usize,
    capacity: usize,
}

impl Segment {
    fn create(dir: &Path, index: u64, capacity: usize) -> Result<Self> {
        let path = segment_path(dir, index);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| JournalError::Storage(e.to_string()))?;
        file.set_len(capacity as u64)
            .map_err(|e| JournalError::Storage(e.to_string()))?;
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| JournalError::Storage(e.to_string()))? };
        Ok(Self {
            index,
            path,
            file,
            mmap,
            cursor: 0,
            capacity,
        })
    }

    /// Opens an existing segment, replaying it to find the live write
    /// cursor (the offset of the first zero-length / invalid record).
    fn open_existing(path: PathBuf, index: u64) -> Result<(Self, Vec<JournalEntry>)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| JournalError::Storage(e.to_string()))?;
        let capacity = file
            .metadata()
            .map_err(|e| JournalError::Storage(e.to_string()))?
            .len() as usize;
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| JournalError::Storage(e.to_string()))? };

        let mut cursor = 0;
        let mut entries = Vec::new();
        loop {
            match wire::decode(&mmap[cursor..]) {
                Ok(Some(decoded)) => {
                    cursor += decoded.len;
                    entries.push(decoded.entry);
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(%error, path = %path.display(), offset = cursor, "journal segment truncated at corrupt record");
                    break;
                }
            }
        }

        Ok((
            Self {
                index,
                path,
                file,
                mmap,
                cursor,
                capacity,
            },
            entries,
        ))
    }

    fn append(&mut self, entry: &JournalEntry) -> Result<bool> {
        let record = wire::encode(entry);
        if self.cursor + record.len() > self.capacity {
            return Ok(false);
        }
        self.mmap[self.cursor..self.cursor + record.len()].copy_from_slice(&record);
        self.mmap
            .flush_range(self.cursor, record.len())
            .map_err(|e| JournalError::Storage(e.to_string()))?;
        self.cursor += record.len();
        Ok(true)
    }
}

fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("segment-{index:020}.log"))
}

pub struct MmapFileStorage {
    dir: PathBuf,
    segment_capacity: usize,
    max_files: usize,
    max_file_age: std::time::Duration,
    compress_old_files: bool,
    active: Mutex<Segment>,
    closed: Mutex<Vec<PathBuf>>,
    index: Mutex<HashMap<TraceId, JournalEntry>>,
}

impl MmapFileStorage {
    pub fn open(dir: impl AsRef<Path>, rotation: &JournalRotationSection) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| JournalError::Storage(e.to_string()))?;

        let mut segment_files: Vec<(u64, PathBuf)> = fs::read_dir(&dir)
            .map_err(|e| JournalError::Storage(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let index = parse_segment_index(&path)?;
                Some((index, path))
            })
            .collect();
        segment_files.sort_by_key(|(index, _)| *index);

        let mut index = HashMap::new();
        let mut closed = Vec::new();
        let capacity = rotation.max_file_size.max(64 * 1024) as usize;

        let active = if let Some((last_index, last_path)) = segment_files.pop() {
            for (seg_index, path) in &segment_files {
                let (_, entries) = Segment::open_existing(path.clone(), *seg_index)?;
                for entry in entries {
                    index.insert(entry.trace_id, entry);
                }
                closed.push(path.clone());
            }
            let (segment, entries) = Segment::open_existing(last_path, last_index)?;
            for entry in entries {
                index.insert(entry.trace_id, entry);
            }
            segment
        } else {
            Segment::create(&dir, 0, capacity)?
        };

        Ok(Self {
            dir,
            segment_capacity: capacity,
            max_files: rotation.max_files.max(1),
            max_file_age: rotation.max_file_age,
            compress_old_files: rotation.compress_old_files,
            active: Mutex::new(active),
            closed: Mutex::new(closed),
            index: Mutex::new(index),
        })
    }

    fn rotate_active(&self, active: &mut Segment) -> Result<()> {
        let next_index = active.index + 1;
        let retired = std::mem::replace(active, Segment::create(&self.dir, next_index, self.segment_capacity)?);
        self.closed.lock().push(retired.path);
        self.enforce_retention()
    }

    fn enforce_retention(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        while closed.len() > self.max_files {
            let oldest = closed.remove(0);
            if self.compress_old_files {
                tracing::debug!(path = %oldest.display(), "skipping compression of rotated segment (not implemented)");
            }
            let _ = fs::remove_file(&oldest);
        }
        let cutoff = SystemTime::now().checked_sub(self.max_file_age);
        if let Some(cutoff) = cutoff {
            closed.retain(|path| {
                let age_ok = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map(|modified| modified >= cutoff)
                    .unwrap_or(true);
                if !age_ok {
                    let _ = fs::remove_file(path);
                }
                age_ok
            });
        }
        Ok(())
    }
}

fn parse_segment_index(path: &Path) -> Option<u64> {
    let name = path.file_stem()?.to_str()?;
    name.strip_prefix("segment-")?.parse().ok()
}

impl JournalStorage for MmapFileStorage {
    fn append(&self, entry: &JournalEntry) -> Result<()> {
        let mut active = self.active.lock();
        if !active.append(entry)? {
            self.rotate_active(&mut active)?;
            if !active.append(entry)? {
                return Err(JournalError::Storage(
                    "entry larger than segment capacity".into(),
                ));
            }
        }
        self.index.lock().insert(entry.trace_id, entry.clone());
        Ok(())
    }

    fn update_state(&self, trace_id: TraceId, state: JournalState, attempts: u32) -> Result<()> {
        let mut entry = {
            let index = self.index.lock();
            index
                .get(&trace_id)
                .cloned()
                .ok_or_else(|| JournalError::NotFound(trace_id.to_string()))?
        };
        if !entry.state.can_transition_to(state) {
            return Err(JournalError::IllegalTransition {
                from: entry.state.to_string(),
                to: state.to_string(),
            });
        }
        entry.state = state;
        entry.attempts = attempts;
        self.append(&entry)
    }

    fn get(&self, trace_id: TraceId) -> Result<Option<JournalEntry>> {
        Ok(self.index.lock().get(&trace_id).cloned())
    }

    fn scan(&self) -> Result<Vec<JournalEntry>> {
        Ok(self.index.lock().values().cloned().collect())
    }

    fn rotate(&self) -> Result<()> {
        let mut active = self.active.lock();
        self.rotate_active(&mut active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellane_types::RequestFingerprint;

    fn rotation() -> JournalRotationSection {
        JournalRotationSection {
            max_file_size: 4096,
            max_files: 3,
            compress_old_files: false,
            max_file_age: std::time::Duration::from_secs(3600),
        }
    }

    fn entry() -> JournalEntry {
        let fp = RequestFingerprint::new("POST", "/orders", b"x".to_vec());
        JournalEntry::new(TraceId::new_v4(), fp)
    }

    #[test]
    fn append_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MmapFileStorage::open(dir.path(), &rotation()).unwrap();
        let e = entry();
        storage.append(&e).unwrap();
        let fetched = storage.get(e.trace_id).unwrap().unwrap();
        assert_eq!(fetched.trace_id, e.trace_id);
        assert_eq!(fetched.state, JournalState::Pending);
    }

    #[test]
    fn update_state_appends_new_record_and_reads_latest() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MmapFileStorage::open(dir.path(), &rotation()).unwrap();
        let e = entry();
        storage.append(&e).unwrap();
        storage
            .update_state(e.trace_id, JournalState::InFlight, 1)
            .unwrap();
        let fetched = storage.get(e.trace_id).unwrap().unwrap();
        assert_eq!(fetched.state, JournalState::InFlight);
        assert_eq!(fetched.attempts, 1);
    }

    #[test]
    fn survives_reopen_and_replays_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let trace_id;
        {
            let storage = MmapFileStorage::open(dir.path(), &rotation()).unwrap();
            let e = entry();
            trace_id = e.trace_id;
            storage.append(&e).unwrap();
            storage
                .update_state(trace_id, JournalState::Completed, 1)
                .unwrap();
        }
        let reopened = MmapFileStorage::open(dir.path(), &rotation()).unwrap();
        let fetched = reopened.get(trace_id).unwrap().unwrap();
        assert_eq!(fetched.state, JournalState::Completed);
    }

    #[test]
    fn rejects_illegal_transition_from_completed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MmapFileStorage::open(dir.path(), &rotation()).unwrap();
        let e = entry();
        storage.append(&e).unwrap();
        storage
            .update_state(e.trace_id, JournalState::Completed, 1)
            .unwrap();
        let result = storage.update_state(e.trace_id, JournalState::InFlight, 2);
        assert!(matches!(result, Err(JournalError::IllegalTransition { .. })));
    }
}
