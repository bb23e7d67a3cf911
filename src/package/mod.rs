pub mod entry;
pub mod header;
pub mod index;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use rayon::prelude::*;

use crate::error::Error;
use crate::qfs;
use crate::tgi::Tgi;

pub use entry::{Entry, Payload};
pub use header::PackageHeader;
pub use index::{CompressionDirectoryEntry, EntryState, IndexRecord};

/// A SimCity 4 DBPF archive: a header, an index of entries, and (if it tracked
/// one from `open`) the original compression directory used to tell already-compressed
/// `Normal` entries apart from plain ones.
pub struct Package {
    header: PackageHeader,
    entries: Vec<Entry>,
    compression_directory: Vec<CompressionDirectoryEntry>,
    file: Option<File>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl Package {
    /// A new, empty archive with no backing file. Call [`Package::save_as`] to
    /// give it a home.
    pub fn create() -> Self {
        Self {
            header: PackageHeader::default(),
            entries: Vec::new(),
            compression_directory: Vec::new(),
            file: None,
            path: None,
            dirty: false,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let header = PackageHeader::read(&mut file)
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;
        if !header.is_valid() {
            return Err(Error::InvalidHeader(
                "signature/version/index-size mismatch".into(),
            ));
        }

        let file_len = file.metadata()?.len();
        if (header.index_entry_count as u64) * IndexRecord::SIZE > file_len {
            return Err(Error::InvalidHeader(
                "index_entry_count too large for file size".into(),
            ));
        }

        file.seek(SeekFrom::Start(header.index_location as u64))?;
        let mut records = Vec::with_capacity(header.index_entry_count as usize);
        for _ in 0..header.index_entry_count {
            records.push(IndexRecord::read(&mut file).map_err(|e| Error::InvalidHeader(e.to_string()))?);
        }

        let compression_directory = match records.iter().find(|r| r.tgi() == Tgi::COMPRESSION_DIRECTORY) {
            Some(dir_record) => {
                file.seek(SeekFrom::Start(dir_record.location as u64))?;
                let count = dir_record.file_size as u64 / CompressionDirectoryEntry::SIZE;
                let mut dir = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    dir.push(
                        CompressionDirectoryEntry::read(&mut file)
                            .map_err(|e| Error::InvalidHeader(e.to_string()))?,
                    );
                }
                dir
            }
            None => Vec::new(),
        };

        let mut entries: Vec<Entry> = records
            .into_iter()
            .map(|r| {
                let tgi = r.tgi();
                let compressed = compression_directory.iter().any(|c| c.tgi() == tgi);
                Entry::new(tgi, EntryState::Normal, Payload::Lazy { location: r.location, size: r.file_size, compressed })
            })
            .collect();
        entries.sort_by_key(|e| match e.payload {
            Payload::Lazy { location, .. } => location,
            Payload::Loaded { .. } => 0,
        });

        Ok(Self {
            header,
            entries,
            compression_directory,
            file: Some(file),
            path: Some(path.to_path_buf()),
            dirty: false,
        })
    }

    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    pub fn index(&self) -> &[Entry] {
        &self.entries
    }

    pub fn compression_directory(&self) -> &[CompressionDirectoryEntry] {
        &self.compression_directory
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Append a new entry in state `New`. Duplicate TGIs are permitted but discouraged.
    pub fn add(&mut self, tgi: Tgi, bytes: Vec<u8>, compress: bool) {
        self.entries.push(Entry::new(
            tgi,
            EntryState::New,
            Payload::Loaded { bytes, compressed: false, compress_hint: compress },
        ));
        self.dirty = true;
    }

    /// Look up the first non-deleted entry matching `tgi`, loading its bytes
    /// from the backing file on first access.
    pub fn get(&mut self, tgi: Tgi) -> Result<&mut Entry, Error> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.tgi == tgi && e.state != EntryState::Deleted)
            .ok_or(Error::NotFound(tgi))?;

        if !self.entries[idx].is_loaded() {
            let (location, size, compressed) = match self.entries[idx].payload {
                Payload::Lazy { location, size, compressed } => (location, size, compressed),
                Payload::Loaded { .. } => unreachable!("is_loaded() just returned false"),
            };
            let file = self
                .file
                .as_mut()
                .ok_or_else(|| Error::LogicError("entry is lazy but archive has no backing file".into()))?;
            file.seek(SeekFrom::Start(location as u64))?;
            let mut bytes = vec![0u8; size as usize];
            file.read_exact(&mut bytes)?;
            self.entries[idx].payload = Payload::Loaded { bytes, compressed, compress_hint: compressed };
        }

        Ok(&mut self.entries[idx])
    }

    /// Mark every entry matching `tgi` as `Deleted`. Not physically discarded
    /// until the next save.
    pub fn remove(&mut self, tgi: Tgi) {
        let mut any = false;
        for entry in self.entries.iter_mut() {
            if entry.tgi == tgi && entry.state != EntryState::Deleted {
                entry.state = EntryState::Deleted;
                any = true;
            }
        }
        if any {
            self.dirty = true;
        }
    }

    /// Save back to the path this archive was opened from or last saved to.
    pub fn save(&mut self) -> Result<(), Error> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::InvalidArgument("no destination path; call save_as".into()))?;
        self.save_as(path)
    }

    /// Save to `path`, which may or may not be the archive's current path.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let same_path = self.path.as_deref() == Some(path);

        if same_path {
            let temp_path = temp_path_for(path);
            {
                let mut temp_file = File::create(&temp_path)?;
                self.write_to(&mut temp_file)?;
            }
            self.file = None; // release the read handle before replacing it
            std::fs::rename(&temp_path, path)?;
        } else {
            let mut out_file = File::create(path)?;
            self.write_to(&mut out_file)?;
        }

        self.file = Some(File::open(path)?);
        self.path = Some(path.to_path_buf());
        self.dirty = false;
        Ok(())
    }

    /// The full write sequence from an open write-or-create handle: provisional
    /// header, trimmed and re-encoded entries, rebuilt compression directory,
    /// index, final header.
    fn write_to<W: Write + Seek>(&mut self, writer: &mut W) -> Result<(), Error> {
        writer.seek(SeekFrom::Start(0))?;
        PackageHeader::default()
            .write(writer)
            .map_err(|e| Error::LogicError(e.to_string()))?;

        let surviving: Vec<Entry> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| e.state != EntryState::Deleted && e.tgi != Tgi::COMPRESSION_DIRECTORY)
            .collect();

        // Pass 1 (sequential): resolve every entry's bytes, reading `Normal`/lazy
        // entries from the old backing file. `New`/`Modified` entries that want
        // compression are left as `NeedsCompress` for the parallel pass below.
        let mut prepared = Vec::with_capacity(surviving.len());
        for entry in surviving {
            prepared.push((entry.tgi, self.prepare_for_save(entry)?));
        }

        // Pass 2 (parallel): QFS-compress every candidate independently. This is
        // the one place the archive fans CPU work out across a `rayon` pool —
        // it does not change the single-threaded ownership model of `Package`.
        let prepared: Vec<(Tgi, PreparedPayload)> = prepared
            .into_par_iter()
            .map(|(tgi, payload)| {
                let resolved = match payload {
                    PreparedPayload::NeedsCompress { raw, compress_hint } => {
                        match qfs::compress(&raw, false) {
                            Some(compressed) if compressed.len() < raw.len() => PreparedPayload::Done {
                                bytes: compressed,
                                compressed: true,
                                compress_hint,
                                directory_record: Some(CompressionDirectoryEntry {
                                    type_id: tgi.type_id,
                                    group_id: tgi.group_id,
                                    instance_id: tgi.instance_id,
                                    uncompressed_size: raw.len() as u32,
                                }),
                            },
                            _ => {
                                debug!("entry {:?} did not shrink under QFS; storing uncompressed", tgi);
                                PreparedPayload::Done { bytes: raw, compressed: false, compress_hint, directory_record: None }
                            }
                        }
                    }
                    done => done,
                };
                (tgi, resolved)
            })
            .collect();

        let mut new_directory = Vec::new();
        let mut rebuilt = Vec::with_capacity(prepared.len() + 1);
        let mut locations = Vec::with_capacity(prepared.len() + 1);

        for (tgi, payload) in prepared {
            let PreparedPayload::Done { bytes, compressed, compress_hint, directory_record } = payload else {
                return Err(Error::LogicError("entry left unresolved after compression pass".into()));
            };
            if let Some(record) = directory_record {
                new_directory.push(record);
            }
            let location = writer.stream_position()? as u32;
            writer.write_all(&bytes)?;
            locations.push((location, bytes.len() as u32));
            rebuilt.push(Entry::new(
                tgi,
                EntryState::Normal,
                Payload::Loaded { bytes, compressed, compress_hint },
            ));
        }

        if !new_directory.is_empty() {
            let mut directory_bytes = Vec::with_capacity(new_directory.len() * CompressionDirectoryEntry::SIZE as usize);
            for record in &new_directory {
                record
                    .write(&mut std::io::Cursor::new(&mut directory_bytes))
                    .map_err(|e| Error::LogicError(e.to_string()))?;
            }
            let location = writer.stream_position()? as u32;
            writer.write_all(&directory_bytes)?;
            locations.push((location, directory_bytes.len() as u32));
            rebuilt.push(Entry::new(
                Tgi::COMPRESSION_DIRECTORY,
                EntryState::Normal,
                Payload::Loaded { bytes: directory_bytes, compressed: false, compress_hint: false },
            ));
        }

        let index_location = writer.stream_position()? as u32;
        for (entry, (location, file_size)) in rebuilt.iter().zip(locations.iter()) {
            let record = IndexRecord {
                type_id: entry.tgi.type_id,
                group_id: entry.tgi.group_id,
                instance_id: entry.tgi.instance_id,
                location: *location,
                file_size: *file_size,
            };
            record.write(writer).map_err(|e| Error::LogicError(e.to_string()))?;
        }

        let index_size = rebuilt.len() as u32 * IndexRecord::SIZE as u32;
        let now = now_u32();

        let mut header = self.header;
        header.index_entry_count = rebuilt.len() as u32;
        header.index_location = index_location;
        header.index_size = index_size;
        header.date_modified = now;
        if header.date_created == 0 {
            header.date_created = now;
        }

        writer.seek(SeekFrom::Start(0))?;
        header.write(writer).map_err(|e| Error::LogicError(e.to_string()))?;

        self.header = header;
        self.entries = rebuilt;
        self.compression_directory = new_directory;
        Ok(())
    }

    /// Resolve one surviving entry down to either a finished payload (`Normal`
    /// entries, and `New`/`Modified` entries that don't want compression) or a
    /// pending compression candidate for the parallel pass in [`Self::write_to`].
    fn prepare_for_save(&mut self, entry: Entry) -> Result<PreparedPayload, Error> {
        match entry.state {
            EntryState::New | EntryState::Modified => {
                let (raw, compress_hint) = match entry.payload {
                    Payload::Loaded { bytes, compress_hint, .. } => (bytes, compress_hint),
                    Payload::Lazy { .. } => {
                        return Err(Error::LogicError(
                            "new/modified entry has no in-memory payload".into(),
                        ))
                    }
                };
                if compress_hint {
                    Ok(PreparedPayload::NeedsCompress { raw, compress_hint })
                } else {
                    Ok(PreparedPayload::Done { bytes: raw, compressed: false, compress_hint, directory_record: None })
                }
            }
            EntryState::Normal => {
                let (bytes, compressed) = match entry.payload {
                    Payload::Loaded { bytes, compressed, .. } => (bytes, compressed),
                    Payload::Lazy { location, size, compressed } => {
                        let file = self.file.as_mut().ok_or_else(|| {
                            Error::LogicError("normal entry is lazy but archive has no backing file".into())
                        })?;
                        file.seek(SeekFrom::Start(location as u64))?;
                        let mut buf = vec![0u8; size as usize];
                        file.read_exact(&mut buf)?;
                        (buf, compressed)
                    }
                };
                let directory_record = if compressed {
                    match self.compression_directory.iter().find(|c| c.tgi() == entry.tgi) {
                        Some(old) => Some(*old),
                        None => {
                            warn!(
                                "entry {:?} looks QFS-compressed but had no compression-directory record; \
                                 forwarding bytes without one",
                                entry.tgi
                            );
                            None
                        }
                    }
                } else {
                    None
                };
                Ok(PreparedPayload::Done { bytes, compressed, compress_hint: compressed, directory_record })
            }
            EntryState::Deleted => unreachable!("deleted entries are filtered before this is called"),
        }
    }
}

/// An entry mid-way through [`Package::write_to`]: either already resolved to
/// final bytes, or still waiting on the parallel QFS compression pass.
enum PreparedPayload {
    Done { bytes: Vec<u8>, compressed: bool, compress_hint: bool, directory_record: Option<CompressionDirectoryEntry> },
    NeedsCompress { raw: Vec<u8>, compress_hint: bool },
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn now_u32() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tgi::Tgi;
    use tempfile::tempdir;

    #[test]
    fn create_add_save_reopen_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.dat");

        let mut pkg = Package::create();
        let tgi = Tgi::new(0x6534284A, 0x1, 0x2);
        pkg.add(tgi, b"Hello, world!\n".to_vec(), true);
        pkg.save_as(&path).unwrap();

        let mut reopened = Package::open(&path).unwrap();
        assert_eq!(reopened.header().index_entry_count as usize, reopened.index().len());
        let entry = reopened.get(tgi).unwrap();
        assert!(entry.is_compressed());
        assert_eq!(entry.uncompressed_bytes().unwrap(), b"Hello, world!\n");
    }

    #[test]
    fn compression_fallback_for_tiny_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.dat");

        let mut pkg = Package::create();
        let tgi = Tgi::new(1, 1, 1);
        pkg.add(tgi, vec![7u8; 9], true);
        pkg.save_as(&path).unwrap();

        let mut reopened = Package::open(&path).unwrap();
        let entry = reopened.get(tgi).unwrap();
        assert!(!entry.is_compressed());
        assert!(reopened.compression_directory().iter().all(|c| c.tgi() != tgi));
    }

    #[test]
    fn delete_then_save_drops_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.dat");

        let a = Tgi::new(1, 0, 1);
        let b = Tgi::new(1, 0, 2);
        let c = Tgi::new(1, 0, 3);

        let mut pkg = Package::create();
        pkg.add(a, b"AAAA".to_vec(), false);
        pkg.add(b, b"BBBBBBBB".to_vec(), false);
        pkg.add(c, b"CC".to_vec(), false);
        pkg.save_as(&path).unwrap();

        let mut pkg = Package::open(&path).unwrap();
        pkg.remove(b);
        pkg.save_as(&path).unwrap();

        let mut reopened = Package::open(&path).unwrap();
        assert_eq!(reopened.index().len(), 2);
        assert!(reopened.get(a).is_ok());
        assert!(reopened.get(c).is_ok());
        assert!(matches!(reopened.get(b), Err(Error::NotFound(_))));
    }

    #[test]
    fn same_path_save_replaces_file_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.dat");

        let mut pkg = Package::create();
        pkg.add(Tgi::new(2, 0, 1), b"first version".to_vec(), false);
        pkg.save_as(&path).unwrap();

        pkg.add(Tgi::new(2, 0, 2), b"second version".to_vec(), false);
        pkg.save().unwrap();

        let mut reopened = Package::open(&path).unwrap();
        assert_eq!(reopened.index().len(), 2);
        assert_eq!(
            reopened.get(Tgi::new(2, 0, 2)).unwrap().uncompressed_bytes().unwrap(),
            b"second version"
        );
    }
}
