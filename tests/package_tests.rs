use dbpf::{Package, Tgi};
use tempfile::tempdir;

/// Surfaces the crate's `log::debug!`/`log::warn!` calls (compression
/// fallback, missing compression-directory records) under `RUST_LOG` when
/// running these tests, the way the teacher's own binary sets up `env_logger`
/// before doing any archive work. Safe to call from every test: `try_init`
/// is a no-op after the first successful call in the process.
fn init_logging() {
    let _ = env_logger::try_init();
}

#[test]
fn saved_header_index_size_matches_entry_count() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("sized.dat");

    let mut pkg = Package::create();
    for i in 0..5u32 {
        pkg.add(Tgi::new(1, 0, i), format!("entry {i}").into_bytes(), i % 2 == 0);
    }
    pkg.save_as(&path).unwrap();

    let reopened = Package::open(&path).unwrap();
    assert_eq!(reopened.header().index_size, reopened.header().index_entry_count * 20);
    assert_eq!(reopened.index().len(), 5);
}

#[test]
fn compressed_entries_are_all_listed_in_compression_directory() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.dat");

    let compressible = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabc".to_vec();
    let a = Tgi::new(2, 0, 1);
    let b = Tgi::new(2, 0, 2);

    let mut pkg = Package::create();
    pkg.add(a, compressible.clone(), true);
    pkg.add(b, b"tiny".to_vec(), false);
    pkg.save_as(&path).unwrap();

    let mut reopened = Package::open(&path).unwrap();
    assert!(reopened.compression_directory().iter().any(|c| c.tgi() == a));
    assert!(reopened.compression_directory().iter().all(|c| c.tgi() != b));

    let entry_a = reopened.get(a).unwrap();
    assert!(entry_a.is_compressed());
    assert_eq!(entry_a.uncompressed_bytes().unwrap(), compressible.as_slice());
}

#[test]
fn deleted_entries_never_reappear_after_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gone.dat");

    let keep = Tgi::new(3, 0, 1);
    let gone = Tgi::new(3, 0, 2);

    let mut pkg = Package::create();
    pkg.add(keep, b"keep me".to_vec(), false);
    pkg.add(gone, b"drop me".to_vec(), false);
    pkg.remove(gone);
    pkg.save_as(&path).unwrap();

    let mut reopened = Package::open(&path).unwrap();
    assert_eq!(reopened.index().len(), 1);
    assert!(reopened.get(keep).is_ok());
    assert!(reopened.get(gone).is_err());
}

#[test]
fn reopening_missing_path_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("does-not-exist.dat");
    assert!(Package::open(&path).is_err());
}
