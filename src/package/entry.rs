use crate::error::Error;
use crate::package::index::EntryState;
use crate::qfs;
use crate::tgi::Tgi;

/// Where an entry's bytes currently live.
///
/// Never both compressed and uncompressed at once: an entry is either a
/// still-unread `location`/`size` pair into the backing file (with its
/// compression-directory membership already resolved at open time, so
/// `is_compressed` doesn't need the bytes in hand to answer), or an in-memory
/// buffer (which may itself be QFS-compressed).
#[derive(Debug, Clone)]
pub enum Payload {
    Lazy { location: u32, size: u32, compressed: bool },
    Loaded { bytes: Vec<u8>, compressed: bool, compress_hint: bool },
}

/// One logical record in a [`crate::Package`]: its identity, lifecycle state,
/// and bytes (possibly not yet read from the backing file).
#[derive(Debug, Clone)]
pub struct Entry {
    pub tgi: Tgi,
    pub state: EntryState,
    pub(crate) payload: Payload,
    uncompressed_cache: Option<Vec<u8>>,
}

impl Entry {
    pub(crate) fn new(tgi: Tgi, state: EntryState, payload: Payload) -> Self {
        Self { tgi, state, payload, uncompressed_cache: None }
    }

    /// True once the payload bytes are in memory (compressed or not).
    pub fn is_loaded(&self) -> bool {
        matches!(self.payload, Payload::Loaded { .. })
    }

    /// True if this entry's bytes are QFS-compressed, whether or not they've
    /// been read from the backing file yet: a `Lazy` payload already carries
    /// its compression-directory membership, resolved once at
    /// [`crate::Package::open`] time, so this never has to guess.
    pub fn is_compressed(&self) -> bool {
        match &self.payload {
            Payload::Loaded { compressed, .. } => *compressed,
            Payload::Lazy { compressed, .. } => *compressed,
        }
    }

    pub fn compress_hint(&self) -> bool {
        match &self.payload {
            Payload::Loaded { compress_hint, .. } => *compress_hint,
            Payload::Lazy { .. } => false,
        }
    }

    /// The raw bytes as stored (compressed or not). Requires the payload to
    /// already be loaded.
    pub fn raw_bytes(&self) -> Result<&[u8], Error> {
        match &self.payload {
            Payload::Loaded { bytes, .. } => Ok(bytes),
            Payload::Lazy { .. } => {
                Err(Error::LogicError("entry payload not loaded from backing file".into()))
            }
        }
    }

    /// The decoded bytes, decompressing via QFS on first access and caching
    /// the result for the entry's lifetime. The returned slice is a view into
    /// that cache; callers that need an owned, independently-mutable copy
    /// should call `.to_vec()` on it.
    pub fn uncompressed_bytes(&mut self) -> Result<&[u8], Error> {
        if self.uncompressed_cache.is_none() {
            let bytes = match &self.payload {
                Payload::Loaded { bytes, compressed, .. } => {
                    if *compressed {
                        qfs::decompress(bytes)?
                    } else {
                        bytes.clone()
                    }
                }
                Payload::Lazy { .. } => {
                    return Err(Error::LogicError(
                        "entry payload not loaded from backing file".into(),
                    ))
                }
            };
            self.uncompressed_cache = Some(bytes);
        }
        Ok(self.uncompressed_cache.as_ref().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_bytes_caches_after_first_decode() {
        let mut entry = Entry::new(
            Tgi::new(1, 2, 3),
            EntryState::New,
            Payload::Loaded { bytes: b"hello".to_vec(), compressed: false, compress_hint: false },
        );
        assert_eq!(entry.uncompressed_bytes().unwrap(), b"hello");
        assert!(entry.uncompressed_cache.is_some());
    }

    #[test]
    fn lazy_payload_rejects_uncompressed_bytes_before_load() {
        let mut entry = Entry::new(
            Tgi::new(1, 2, 3),
            EntryState::Normal,
            Payload::Lazy { location: 96, size: 10, compressed: false },
        );
        assert!(matches!(entry.uncompressed_bytes(), Err(Error::LogicError(_))));
    }

    #[test]
    fn lazy_payload_reports_compression_without_loading() {
        let entry = Entry::new(
            Tgi::new(1, 2, 3),
            EntryState::Normal,
            Payload::Lazy { location: 96, size: 10, compressed: true },
        );
        assert!(!entry.is_loaded());
        assert!(entry.is_compressed());
    }
}
