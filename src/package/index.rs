use binrw::binrw;

use crate::tgi::Tgi;

/// On-disk shape of one index slot: 20 bytes, all little-endian `u32`.
#[binrw]
#[derive(Debug, Clone, Copy)]
#[br(little)]
#[bw(little)]
pub struct IndexRecord {
    pub type_id: u32,
    pub group_id: u32,
    pub instance_id: u32,
    pub location: u32,
    pub file_size: u32,
}

impl IndexRecord {
    pub const SIZE: u64 = 20;

    pub fn tgi(&self) -> Tgi {
        Tgi::new(self.type_id, self.group_id, self.instance_id)
    }

    pub fn read<R: std::io::Read + std::io::Seek>(reader: &mut R) -> Result<Self, binrw::Error> {
        use binrw::BinReaderExt;
        reader.read_le()
    }

    pub fn write<W: std::io::Write + std::io::Seek>(&self, writer: &mut W) -> Result<(), binrw::Error> {
        use binrw::BinWriterExt;
        writer.write_le(self)
    }
}

/// On-disk shape of one compression-directory slot: 16 bytes, all
/// little-endian `u32`.
#[binrw]
#[derive(Debug, Clone, Copy)]
#[br(little)]
#[bw(little)]
pub struct CompressionDirectoryEntry {
    pub type_id: u32,
    pub group_id: u32,
    pub instance_id: u32,
    pub uncompressed_size: u32,
}

impl CompressionDirectoryEntry {
    pub const SIZE: u64 = 16;

    pub fn tgi(&self) -> Tgi {
        Tgi::new(self.type_id, self.group_id, self.instance_id)
    }

    pub fn read<R: std::io::Read + std::io::Seek>(reader: &mut R) -> Result<Self, binrw::Error> {
        use binrw::BinReaderExt;
        reader.read_le()
    }

    pub fn write<W: std::io::Write + std::io::Seek>(&self, writer: &mut W) -> Result<(), binrw::Error> {
        use binrw::BinWriterExt;
        writer.write_le(self)
    }
}

/// Lifecycle of an in-memory index entry between opens and saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Loaded from disk, unmodified since.
    Normal,
    /// Added this session; no on-disk representation yet.
    New,
    /// Loaded from disk, then replaced this session.
    Modified,
    /// Marked for removal; dropped on the next save.
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_record_tgi_round_trips() {
        let r = IndexRecord { type_id: 1, group_id: 2, instance_id: 3, location: 0, file_size: 0 };
        assert_eq!(r.tgi(), Tgi::new(1, 2, 3));
    }
}
