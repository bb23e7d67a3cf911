use crate::error::Error;
use crate::stream::{read_u24_be, read_u32_be, read_u8, take};

/// Mask applied to the flags byte before comparing it to the `0x10` signature
/// nibble. Ignores exactly the two header flags this codec defines as optional
/// (`0x80` large-size-fields, `0x01` compressed-size-present) — every other bit
/// must be zero for a byte to count as a QFS signature. See DESIGN.md for why
/// this isn't `0x6E`.
const SIGNATURE_MASK: u8 = !(0x80 | 0x01);

/// Locate the QFS/RefPack signature and return the offset at which the header
/// (flags byte + `0xFB`) begins: either 0 ("bare") or 4 ("prefixed" by a 4-byte
/// little-endian compressed length that this decoder otherwise ignores).
fn locate_signature(data: &[u8]) -> Result<usize, Error> {
    let bare = data.len() >= 2 && (data[0] & SIGNATURE_MASK) == 0x10 && data[1] == 0xFB;
    if bare {
        return Ok(0);
    }
    let prefixed = data.len() >= 6 && (data[4] & SIGNATURE_MASK) == 0x10 && data[5] == 0xFB;
    if prefixed {
        return Ok(4);
    }
    Err(Error::UnsupportedCompressionFormat(
        "no QFS signature (0x10 0xFB) at offset 0 or 4".into(),
    ))
}

/// Decompress a QFS/RefPack blob. Accepts both the bare 5-byte-header framing
/// and the 4-byte-length-prefixed framing; tolerates the large-size-field and
/// compressed-size-present header flags.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let header_offset = locate_signature(data)?;
    let mut pos = header_offset;

    let flags = read_u8(data, &mut pos)?;
    let _signature = read_u8(data, &mut pos)?;

    let large_sizes = flags & 0x80 != 0;
    let uncompressed_size = if large_sizes {
        read_u32_be(data, &mut pos)?
    } else {
        read_u24_be(data, &mut pos)?
    } as usize;

    if flags & 0x01 != 0 {
        // A compressed-size field of the same width follows; the decoder doesn't need it.
        let skip = if large_sizes { 4 } else { 3 };
        take(data, &mut pos, skip)?;
    }

    let mut out = vec![0u8; uncompressed_size];
    let mut out_pos = 0usize;

    loop {
        if pos >= data.len() {
            break;
        }
        let b0 = read_u8(data, &mut pos)?;

        if b0 >= 0xFC {
            // EOF opcode.
            let plain = (b0 & 0x03) as usize;
            copy_plain(data, &mut pos, &mut out, &mut out_pos, plain)?;
            break;
        } else if b0 >= 0xE0 {
            let plain = (((b0 & 0x1F) as usize) << 2) + 4;
            copy_plain(data, &mut pos, &mut out, &mut out_pos, plain)?;
        } else if b0 >= 0xC0 {
            let b1 = read_u8(data, &mut pos)?;
            let b2 = read_u8(data, &mut pos)?;
            let b3 = read_u8(data, &mut pos)?;
            let plain = (b0 & 0x03) as usize;
            let copy_count = (((b0 & 0x0C) as usize) << 6) + b3 as usize + 5;
            let copy_offset = (((b0 & 0x10) as usize) << 12) + ((b1 as usize) << 8) + b2 as usize + 1;
            copy_plain(data, &mut pos, &mut out, &mut out_pos, plain)?;
            copy_ref(&mut out, &mut out_pos, copy_count, copy_offset)?;
        } else if b0 >= 0x80 {
            let b1 = read_u8(data, &mut pos)?;
            let b2 = read_u8(data, &mut pos)?;
            let plain = ((b1 & 0xC0) >> 6) as usize;
            let copy_count = ((b0 & 0x3F) as usize) + 4;
            let copy_offset = (((b1 & 0x3F) as usize) << 8) + b2 as usize + 1;
            copy_plain(data, &mut pos, &mut out, &mut out_pos, plain)?;
            copy_ref(&mut out, &mut out_pos, copy_count, copy_offset)?;
        } else {
            let b1 = read_u8(data, &mut pos)?;
            let plain = (b0 & 0x03) as usize;
            let copy_count = (((b0 & 0x1C) as usize) >> 2) + 3;
            let copy_offset = (((b0 & 0x60) as usize) << 3) + b1 as usize + 1;
            copy_plain(data, &mut pos, &mut out, &mut out_pos, plain)?;
            copy_ref(&mut out, &mut out_pos, copy_count, copy_offset)?;
        }

        if out_pos >= uncompressed_size {
            break;
        }
    }

    Ok(out)
}

fn copy_plain(
    src: &[u8],
    src_pos: &mut usize,
    dest: &mut [u8],
    dest_pos: &mut usize,
    count: usize,
) -> Result<(), Error> {
    if count == 0 {
        return Ok(());
    }
    let bytes = take(src, src_pos, count)?;
    let end = dest_pos.checked_add(count).ok_or_else(|| {
        Error::MalformedRecord("literal run overruns uncompressed size".into())
    })?;
    if end > dest.len() {
        return Err(Error::MalformedRecord("literal run overruns uncompressed size".into()));
    }
    dest[*dest_pos..end].copy_from_slice(bytes);
    *dest_pos = end;
    Ok(())
}

/// Self-referential LZ77 copy: `offset` bytes behind the write cursor, one byte
/// at a time (overlapping copies must observe bytes written earlier in the same
/// call — e.g. offset=1 run-length-encodes a repeated byte).
fn copy_ref(dest: &mut [u8], dest_pos: &mut usize, count: usize, offset: usize) -> Result<(), Error> {
    if offset == 0 || offset > *dest_pos {
        return Err(Error::MalformedRecord(format!(
            "copy offset {offset} exceeds current output cursor {dest_pos}"
        )));
    }
    let end = dest_pos.checked_add(count).ok_or_else(|| {
        Error::MalformedRecord("copy run overruns uncompressed size".into())
    })?;
    if end > dest.len() {
        return Err(Error::MalformedRecord("copy run overruns uncompressed size".into()));
    }
    for _ in 0..count {
        dest[*dest_pos] = dest[*dest_pos - offset];
        *dest_pos += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_signature() {
        let data = [0u8; 8];
        assert!(matches!(
            decompress(&data),
            Err(Error::UnsupportedCompressionFormat(_))
        ));
    }

    #[test]
    fn self_referential_copy_overlaps() {
        // header: flags=0x10, sig=0xFB, size=4 (3-byte BE)
        let mut data = vec![0x10, 0xFB, 0x00, 0x00, 0x04];
        // 2-byte op 0x01 0x00: plain=1 (writes 'A'), copy_count=3, copy_offset=1 —
        // a self-referential run-length copy of the byte directly behind the cursor.
        data.extend_from_slice(&[0x01, 0x00, 0x41]);
        let out = decompress(&data).unwrap();
        assert_eq!(out, b"AAAA".to_vec());
    }

    #[test]
    fn copy_offset_beyond_cursor_is_malformed() {
        let mut data = vec![0x10, 0xFB, 0x00, 0x00, 0x03];
        // 3-byte op with an offset far beyond any written data.
        data.extend_from_slice(&[0x80, 0x3F, 0xFF]);
        assert!(matches!(decompress(&data), Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn accepts_length_prefixed_framing() {
        let payload = vec![0x10, 0xFB, 0x00, 0x00, 0x03, 0xFC | 0x03, b'a', b'b', b'c'];
        let mut framed = (payload.len() as u32).to_le_bytes().to_vec();
        framed.extend_from_slice(&payload);
        let out = decompress(&framed).unwrap();
        assert_eq!(out, b"abc".to_vec());
    }
}
