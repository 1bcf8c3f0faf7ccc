//! Versioned little-endian on-disk format.
//!
//! ```text
//! offset size field
//! 0      4    magic  b"TFPX"
//! 4      2    format version
//! 6      2    hash scheme version
//! 8      2    hash width in bits
//! 10     2    reserved (0)
//! 12     8    hash profile (0 = unbound)
//! 20     8    posting count n
//! 28     12n  postings sorted by (hash, track, anchor time):
//!             hash u32, track id u32, anchor time ms u32
//! ```
//!
//! The hash profile is a digest of the extraction and pairing settings the
//! postings were computed under. Only live postings are written, so a load
//! always yields a compacted index.

use bytes::{Buf, BufMut, BytesMut};
use fingerprint::{FingerprintHash, HASH_BITS, HASH_SCHEME_VERSION};

use crate::error::IndexError;
use crate::types::{Posting, TrackId};

/// File magic.
pub const INDEX_MAGIC: [u8; 4] = *b"TFPX";

/// Bump whenever the on-disk layout changes.
pub const INDEX_FORMAT_VERSION: u16 = 2;

pub(crate) const HEADER_LEN: usize = 28;
pub(crate) const POSTING_LEN: usize = 12;

/// `field` reported by [`IndexError::VersionMismatch`] for profile clashes.
pub const PROFILE_FIELD: &str = "hash profile";

pub(crate) fn encode(postings: &[Posting], profile: Option<u64>) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + postings.len() * POSTING_LEN);
    buf.put_slice(&INDEX_MAGIC);
    buf.put_u16_le(INDEX_FORMAT_VERSION);
    buf.put_u16_le(HASH_SCHEME_VERSION);
    buf.put_u16_le(HASH_BITS);
    buf.put_u16_le(0);
    buf.put_u64_le(profile.unwrap_or(0));
    buf.put_u64_le(postings.len() as u64);
    for p in postings {
        buf.put_u32_le(p.hash.value());
        buf.put_u32_le(p.track_id.0);
        buf.put_u32_le(p.anchor_time_ms);
    }
    buf
}

pub(crate) fn check_version(
    field: &'static str,
    expected: u64,
    found: u64,
) -> Result<(), IndexError> {
    if expected != found {
        return Err(IndexError::VersionMismatch {
            field,
            expected,
            found,
        });
    }
    Ok(())
}

/// A decoded index image.
#[derive(Debug, PartialEq)]
pub(crate) struct Decoded {
    pub profile: Option<u64>,
    pub postings: Vec<Posting>,
}

/// Decode and verify an index image. Versions, and the hash profile when
/// `expected_profile` is given, are checked before any posting is read.
pub(crate) fn decode(
    mut data: &[u8],
    expected_profile: Option<u64>,
) -> Result<Decoded, IndexError> {
    if data.len() < HEADER_LEN {
        return Err(IndexError::Corrupt(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            data.len()
        )));
    }
    let mut magic = [0u8; 4];
    data.copy_to_slice(&mut magic);
    if magic != INDEX_MAGIC {
        return Err(IndexError::Corrupt(format!("bad magic {magic:02x?}")));
    }

    check_version(
        "format version",
        INDEX_FORMAT_VERSION.into(),
        data.get_u16_le().into(),
    )?;
    check_version(
        "hash scheme version",
        HASH_SCHEME_VERSION.into(),
        data.get_u16_le().into(),
    )?;
    check_version("hash width", HASH_BITS.into(), data.get_u16_le().into())?;
    let _reserved = data.get_u16_le();
    let profile = Some(data.get_u64_le()).filter(|&p| p != 0);
    if let (Some(expected), Some(found)) = (expected_profile, profile) {
        check_version(PROFILE_FIELD, expected, found)?;
    }

    let count = data.get_u64_le();
    let expected_len = (count as u128) * POSTING_LEN as u128;
    if data.remaining() as u128 != expected_len {
        return Err(IndexError::Corrupt(format!(
            "header declares {count} postings but {} payload bytes follow",
            data.remaining()
        )));
    }

    let mut postings = Vec::with_capacity(count as usize);
    while data.has_remaining() {
        postings.push(Posting {
            hash: FingerprintHash(data.get_u32_le()),
            track_id: TrackId(data.get_u32_le()),
            anchor_time_ms: data.get_u32_le(),
        });
    }
    if let Some(i) = postings.windows(2).position(|w| w[0] >= w[1]) {
        return Err(IndexError::Corrupt(format!(
            "postings out of order at position {}",
            i + 1
        )));
    }
    Ok(Decoded { profile, postings })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: u64 = 0x0bad_cafe_f00d_d00d;

    fn posting(hash: u32, track: u32, t: u32) -> Posting {
        Posting {
            hash: FingerprintHash(hash),
            track_id: TrackId(track),
            anchor_time_ms: t,
        }
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let buf = encode(&[posting(0x0102_0304, 7, 1_000)], Some(PROFILE));
        assert_eq!(&buf[0..4], b"TFPX");
        assert_eq!(&buf[4..6], &INDEX_FORMAT_VERSION.to_le_bytes());
        assert_eq!(&buf[6..8], &HASH_SCHEME_VERSION.to_le_bytes());
        assert_eq!(&buf[8..10], &32u16.to_le_bytes());
        assert_eq!(&buf[10..12], &[0, 0]);
        assert_eq!(&buf[12..20], &PROFILE.to_le_bytes());
        assert_eq!(&buf[20..28], &1u64.to_le_bytes());
        assert_eq!(&buf[28..32], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[32..36], &7u32.to_le_bytes());
        assert_eq!(&buf[36..40], &1_000u32.to_le_bytes());
        assert_eq!(buf.len(), HEADER_LEN + POSTING_LEN);
    }

    #[test]
    fn decode_reads_what_encode_writes() {
        let postings = vec![posting(1, 2, 3), posting(1, 3, 0), posting(9, 1, 50)];
        let decoded = decode(&encode(&postings, Some(PROFILE)), Some(PROFILE)).unwrap();
        assert_eq!(decoded.postings, postings);
        assert_eq!(decoded.profile, Some(PROFILE));
    }

    #[test]
    fn unbound_profile_is_written_as_zero() {
        let buf = encode(&[posting(1, 1, 1)], None);
        assert_eq!(&buf[12..20], &[0u8; 8]);
        // An unbound image is accepted under any profile.
        assert_eq!(decode(&buf, Some(PROFILE)).unwrap().profile, None);
    }

    #[test]
    fn rejects_other_hash_profile_before_payload() {
        let mut buf = encode(&[posting(1, 1, 1)], Some(PROFILE));
        buf.truncate(HEADER_LEN + 5);
        assert_eq!(
            decode(&buf, Some(PROFILE + 1)).unwrap_err(),
            IndexError::VersionMismatch {
                field: PROFILE_FIELD,
                expected: PROFILE + 1,
                found: PROFILE,
            }
        );
    }

    #[test]
    fn rejects_other_hash_scheme() {
        let mut buf = encode(&[posting(1, 1, 1)], None);
        buf[6..8].copy_from_slice(&(HASH_SCHEME_VERSION + 1).to_le_bytes());
        assert_eq!(
            decode(&buf, None).unwrap_err(),
            IndexError::VersionMismatch {
                field: "hash scheme version",
                expected: HASH_SCHEME_VERSION.into(),
                found: u64::from(HASH_SCHEME_VERSION) + 1,
            }
        );
    }

    #[test]
    fn version_is_checked_before_length() {
        let mut buf = encode(&[posting(1, 1, 1)], None);
        buf[4..6].copy_from_slice(&9u16.to_le_bytes());
        buf.truncate(HEADER_LEN + 3);
        assert!(matches!(
            decode(&buf, None),
            Err(IndexError::VersionMismatch { field: "format version", .. })
        ));
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let buf = encode(&[posting(1, 1, 1), posting(2, 1, 1)], None);
        let mut bad = buf.clone();
        bad[0] = b'X';
        assert!(matches!(decode(&bad, None), Err(IndexError::Corrupt(_))));
        assert!(matches!(
            decode(&buf[..buf.len() - 1], None),
            Err(IndexError::Corrupt(_))
        ));
        assert!(matches!(decode(&buf[..10], None), Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn rejects_unsorted_payload() {
        let mut buf = encode(&[posting(1, 1, 1), posting(2, 1, 1)], None);
        buf[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&5u32.to_le_bytes());
        assert!(matches!(decode(&buf, None), Err(IndexError::Corrupt(_))));
    }
}
