use dbpf::Ltext;

#[test]
fn hi_encodes_to_the_documented_bytes() {
    let ltext = Ltext::new("Hi");
    let bytes = ltext.encode().unwrap();
    assert_eq!(bytes, vec![0x02, 0x00, 0x00, 0x10, 0x48, 0x00, 0x69, 0x00]);
}

#[test]
fn round_trips_through_utf16() {
    let ltext = Ltext::new("Crystal Heights Elementary");
    let bytes = ltext.encode().unwrap();
    assert_eq!(Ltext::from_bytes(&bytes).unwrap(), ltext);
}

#[test]
fn round_trips_non_ascii_text() {
    let ltext = Ltext::new("Caf\u{e9} de Paris");
    let bytes = ltext.encode().unwrap();
    assert_eq!(Ltext::from_bytes(&bytes).unwrap(), ltext);
}

#[test]
fn value_over_max_length_is_rejected_at_encode_time() {
    let ltext = Ltext::new("x".repeat(65536));
    assert!(ltext.encode().is_err());
}

#[test]
fn value_at_max_length_encodes_successfully() {
    let ltext = Ltext::new("x".repeat(65535));
    assert!(ltext.encode().is_ok());
}
