use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Event;

/// Bytes of framing around each record: length prefix and CRC trailer.
const FRAME_OVERHEAD: usize = 8;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]` onto `out`.
fn frame_event(out: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "journal record too large"))?;
    out.reserve(payload.len() + FRAME_OVERHEAD);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// Durable byte store under a journal.
pub trait Sink: Write + Send {
    /// Make everything written so far durable.
    fn sync(&mut self) -> io::Result<()>;
    /// Cut the store back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Sink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }
}

/// Append-only property journal of framed events.
///
/// Batches are all-or-nothing on disk: a batch whose write or sync fails is cut back
/// off the file before the error is reported, so no event the caller was told failed
/// can come back on replay. A crash mid-batch leaves a torn tail that replay drops.
pub struct Journal<S: Sink = File> {
    sink: S,
    path: PathBuf,
    /// File length covered by successful syncs.
    durable_len: u64,
    appends_since_compact: u64,
    scratch: Vec<u8>,
}

impl Journal<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self::with_sink(file, path, durable_len))
    }

    /// Write the compacted event set next to the journal and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut bytes = Vec::new();
        for event in events {
            frame_event(&mut bytes, event)?;
        }
        let mut writer = BufWriter::new(File::create(compact_path(path))?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the journal and reopen for append.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.sink = file;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Every intact event in the journal at `path`. A missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let events = replay_from(BufReader::new(file))?;
        tracing::debug!(path = %path.display(), events = events.len(), "journal replayed");
        Ok(events)
    }
}

impl<S: Sink> Journal<S> {
    /// Wrap a sink that already holds `durable_len` bytes of journal.
    pub fn with_sink(sink: S, path: &Path, durable_len: u64) -> Self {
        Self {
            sink,
            path: path.to_path_buf(),
            durable_len,
            appends_since_compact: 0,
            scratch: Vec::new(),
        }
    }

    /// Write and sync `events` as one unit.
    ///
    /// On failure the sink is truncated to the last durable length before the error
    /// returns. If that truncation fails too the stray bytes stay behind a torn frame
    /// or a CRC mismatch at worst, and replay stops there.
    pub fn commit(&mut self, events: &[Event]) -> io::Result<()> {
        self.scratch.clear();
        for event in events {
            frame_event(&mut self.scratch, event)?;
        }

        let written = self
            .sink
            .write_all(&self.scratch)
            .and_then(|()| self.sink.flush())
            .and_then(|()| self.sink.sync());
        match written {
            Ok(()) => {
                self.durable_len += self.scratch.len() as u64;
                self.appends_since_compact += events.len() as u64;
                Ok(())
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    events = events.len(),
                    error = %e,
                    "journal batch failed, rolling back"
                );
                if let Err(cut) = self.sink.truncate(self.durable_len) {
                    error!(path = %self.path.display(), error = %cut, "journal rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Commit a single event.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.commit(std::slice::from_ref(event))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn durable_len(&self) -> u64 {
        self.durable_len
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

fn compact_path(path: &Path) -> PathBuf {
    path.with_extension("journal.tmp")
}

/// Fill `buf`, or report `false` if the input ends first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode framed events until the input ends or a record fails its checks.
pub fn replay_from(mut reader: impl Read) -> io::Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut word = [0u8; 4];
    loop {
        if !read_full(&mut reader, &mut word)? {
            break;
        }
        let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
        if !read_full(&mut reader, &mut payload)? || !read_full(&mut reader, &mut word)? {
            warn!(records = events.len(), "journal: torn tail dropped");
            break;
        }
        if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
            warn!(records = events.len(), "journal: checksum mismatch, dropping tail");
            break;
        }
        match bincode::deserialize::<Event>(&payload) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(records = events.len(), error = %e, "journal: undecodable record, dropping tail");
                break;
            }
        }
    }
    Ok(events)
}
