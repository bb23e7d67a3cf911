use binrw::binrw;

/// The `(type, group, instance)` triple that identifies a record inside a DBPF archive.
///
/// Equality and hashing are structural over all three fields. Uniqueness of the
/// triple within one archive is a soft invariant only: duplicates are tolerated on
/// read and collapsed on delete (see [`crate::package::Package::remove`]).
#[binrw]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[br(little)]
#[bw(little)]
pub struct Tgi {
    pub type_id: u32,
    pub group_id: u32,
    pub instance_id: u32,
}

impl Tgi {
    pub const EMPTY: Tgi = Tgi { type_id: 0, group_id: 0, instance_id: 0 };

    /// The well-known TGI of the compression-directory record (never itself compressed,
    /// never listed inside itself).
    pub const COMPRESSION_DIRECTORY: Tgi = Tgi {
        type_id: 0xE86B_1EEF,
        group_id: 0xE86B_1EEF,
        instance_id: 0x286B_1F03,
    };

    pub fn new(type_id: u32, group_id: u32, instance_id: u32) -> Self {
        Self { type_id, group_id, instance_id }
    }
}
