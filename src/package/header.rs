use binrw::binrw;

/// The 96-byte DBPF v1.0 / index-v7 header: a 4-byte signature followed by 14
/// little-endian `u32` fields and 36 reserved zero bytes.
#[binrw]
#[derive(Debug, Clone, Copy)]
#[br(little)]
#[bw(little)]
pub struct PackageHeader {
    pub magic: [u8; 4],
    pub major: u32,
    pub minor: u32,
    pub unused1: u32,
    pub unused2: u32,
    pub date_created: u32,
    pub date_modified: u32,
    pub index_major_version: u32,
    pub index_entry_count: u32,
    pub index_location: u32,
    pub index_size: u32,
    pub hole_entry_count: u32,
    pub hole_offset: u32,
    pub hole_size: u32,
    pub index_minor_version: u32,
    pub reserved: [u8; 36],
}

impl Default for PackageHeader {
    fn default() -> Self {
        Self {
            magic: *b"DBPF",
            major: 1,
            minor: 0,
            unused1: 0,
            unused2: 0,
            date_created: 0,
            date_modified: 0,
            index_major_version: 7,
            index_entry_count: 0,
            index_location: 0,
            index_size: 0,
            hole_entry_count: 0,
            hole_offset: 0,
            hole_size: 0,
            index_minor_version: 0,
            reserved: [0u8; 36],
        }
    }
}

impl PackageHeader {
    pub const SIZE: u64 = 96;

    pub fn is_valid(&self) -> bool {
        &self.magic == b"DBPF"
            && self.major == 1
            && self.minor == 0
            && self.index_major_version == 7
            && self.index_size == self.index_entry_count * 20
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_header_is_valid_when_counts_match() {
        let header = PackageHeader::default();
        assert!(header.is_valid());
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut header = PackageHeader::default();
        header.magic = *b"XXXX";
        assert!(!header.is_valid());
    }

    #[test]
    fn rejects_index_size_mismatch() {
        let mut header = PackageHeader::default();
        header.index_entry_count = 2;
        header.index_size = 10;
        assert!(!header.is_valid());
    }

    #[test]
    fn roundtrips_through_binrw() {
        let mut header = PackageHeader::default();
        header.index_entry_count = 3;
        header.index_size = 60;
        header.index_location = 96;

        let mut buf = Cursor::new(Vec::new());
        header.write(&mut buf).unwrap();
        assert_eq!(buf.get_ref().len(), PackageHeader::SIZE as usize);

        buf.set_position(0);
        let read_back = PackageHeader::read(&mut buf).unwrap();
        assert_eq!(read_back.index_entry_count, 3);
        assert_eq!(read_back.index_location, 96);
        assert!(read_back.is_valid());
    }
}
