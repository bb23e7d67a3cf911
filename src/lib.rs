//! Read, mutate, and write SimCity 4 DBPF archives: the QFS/RefPack codec,
//! the DBPF container itself, and the two record formats most tools need to
//! look inside — Exemplar/Cohort property bags and LTEXT localized strings.

pub mod error;
pub mod exemplar;
pub mod ltext;
pub mod package;
pub mod qfs;
pub mod stream;
pub mod tgi;

pub use error::Error;
pub use exemplar::{Exemplar, ExemplarProperty};
pub use ltext::Ltext;
pub use package::entry::{Entry, Payload};
pub use package::header::PackageHeader;
pub use package::index::{CompressionDirectoryEntry, EntryState, IndexRecord};
pub use package::Package;
pub use tgi::Tgi;
