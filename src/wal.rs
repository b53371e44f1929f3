use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::limits::MAX_JOURNAL_ENTRY_BYTES;
use crate::model::Event;

/// Frame one event as `[len][bincode][crc32]`.
fn encode_event(event: &Event) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_JOURNAL_ENTRY_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "journal entry too large"));
    }
    let mut entry = Vec::with_capacity(payload.len() + 8);
    entry.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    entry.extend_from_slice(&payload);
    entry.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(entry)
}

/// `read_exact` that reports a clean or torn end of file as `None`.
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Next intact entry and its framed size, or `None` at the end of the usable log.
fn decode_event(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if read_chunk(reader, &mut len_buf)?.is_none() {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    // No writer produces this; the prefix itself is garbage.
    if len > MAX_JOURNAL_ENTRY_BYTES {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if read_chunk(reader, &mut payload)?.is_none() {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if read_chunk(reader, &mut crc_buf)?.is_none() {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, len as u64 + 8)))
}

/// Intact events at `path` and the byte length they occupy.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    while let Some((event, framed)) = decode_event(&mut reader)? {
        events.push(event);
        valid_len += framed;
    }
    Ok((events, valid_len))
}

/// Test-only write failures.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Faults {
    /// Write this many bytes of the next entry, then fail.
    pub torn_write: Option<usize>,
    /// Fail every rollback truncation.
    pub stuck_truncate: bool,
}

/// Append-only appointment journal.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// `len` counts the payload only. A torn or corrupt entry ends replay; opening
/// the journal cuts it and anything after it off the file.
///
/// A failed append is rolled back to the last committed entry before the error
/// is returned. If the rollback itself fails the journal refuses appends until
/// it is reopened or rewritten.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Bytes of fsynced, intact entries.
    committed_len: u64,
    failed: bool,
    appends_since_compact: u64,
    #[cfg(test)]
    faults: Faults,
}

impl Wal {
    /// Open the journal at `path` for appending and return the events already
    /// in it. A torn tail is truncated away.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let (events, valid_len) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            warn!(
                path = %path.display(),
                discarded_bytes = file_len - valid_len,
                "truncating unreadable journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            file,
            path: path.to_path_buf(),
            committed_len: valid_len,
            failed: false,
            appends_since_compact: 0,
            #[cfg(test)]
            faults: Faults::default(),
        };
        Ok((wal, events))
    }

    /// Append one event and fsync before returning. On error nothing of the
    /// entry remains in the file.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::other("journal failed to roll back an earlier append; reopen it"));
        }
        let entry = encode_event(event)?;
        if let Err(e) = self.write_entry(&entry) {
            self.roll_back();
            return Err(e);
        }
        self.committed_len += entry.len() as u64;
        self.appends_since_compact += 1;
        Ok(())
    }

    fn write_entry(&mut self, entry: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(keep) = self.faults.torn_write.take() {
            self.file.write_all(&entry[..keep.min(entry.len())])?;
            return Err(io::Error::other("injected torn write"));
        }
        self.file.write_all(entry)?;
        self.file.sync_data()
    }

    fn roll_back(&mut self) {
        if let Err(e) = self.truncate_to_committed() {
            error!(
                path = %self.path.display(),
                committed_len = self.committed_len,
                "journal rollback failed, refusing further appends: {e}"
            );
            self.failed = true;
        }
    }

    fn truncate_to_committed(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if self.faults.stuck_truncate {
            return Err(io::Error::other("injected truncate failure"));
        }
        self.file.set_len(self.committed_len)?;
        self.file.sync_all()
    }

    #[cfg(test)]
    pub(crate) fn inject(&mut self, faults: Faults) {
        self.faults = faults;
    }

    /// True after a rollback failed; appends are refused until a reopen or rewrite.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with `events`: write and fsync a temp file, rename it
    /// over the log, reopen for appending. Clears a failed state.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                writer.write_all(&encode_event(event)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let reopened = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|file| Ok((file.metadata()?.len(), file)));
        match reopened {
            Ok((len, file)) => {
                self.file = file;
                self.committed_len = len;
                self.failed = false;
                self.appends_since_compact = 0;
                Ok(())
            }
            Err(e) => {
                // The handle still points at the replaced file.
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Every intact event in the log at `path`. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}
