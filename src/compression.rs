use crate::buffer::{ScanCursor, ScanError, ScanResult};
use crate::protocol::CompressionMethod;
#[cfg(feature = "compression")]
use crate::{ClickhouseError, Result};

/// Compressed frame layout:
/// `[checksum:16][algo:1][compressed_size_with_header:u32le][uncompressed_size:u32le][payload]`.
/// The checksum is CityHash128 over everything after it; the two sizes count
/// the 9-byte algo+sizes header as part of `compressed_size_with_header`.
pub const FRAME_CHECKSUM_SIZE: usize = 16;
pub const FRAME_HEADER_SIZE: usize = 9;

const MAX_FRAME_SIZE: u32 = 0x4000_0000;

/// Determine from buffered bytes whether one whole frame is present, and how
/// long it is. The algorithm byte is validated here so that garbage after a
/// packet header fails fast instead of demanding 4GiB of buffer.
pub fn scan_frame(cursor: &mut ScanCursor) -> ScanResult<usize> {
    cursor.skip(FRAME_CHECKSUM_SIZE)?;
    let algo = cursor.read_u8()?;
    if CompressionMethod::from_byte(algo).is_none() {
        return Err(ScanError::corrupt(format!(
            "unknown compression algorithm byte: 0x{algo:02X}"
        )));
    }
    let compressed_size = cursor.read_u32_le()?;
    let _uncompressed_size = cursor.read_u32_le()?;
    if compressed_size < FRAME_HEADER_SIZE as u32 || compressed_size > MAX_FRAME_SIZE {
        return Err(ScanError::corrupt(format!(
            "invalid compressed frame size: {compressed_size}"
        )));
    }
    cursor.skip(compressed_size as usize - FRAME_HEADER_SIZE)?;
    Ok(FRAME_CHECKSUM_SIZE + compressed_size as usize)
}

#[cfg(feature = "compression")]
fn checksum(body: &[u8]) -> (u64, u64) {
    let hash = cityhash_rs::cityhash_102_128(body);
    ((hash >> 64) as u64, hash as u64)
}

/// Verify the checksum of a complete frame and decompress its payload onto
/// the end of `out`.
#[cfg(feature = "compression")]
pub fn decompress_frame(frame: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let body = &frame[FRAME_CHECKSUM_SIZE..];
    let (expected_high, expected_low) = (
        u64::from_le_bytes(frame[..8].try_into().unwrap()),
        u64::from_le_bytes(frame[8..16].try_into().unwrap()),
    );
    let (actual_high, actual_low) = checksum(body);
    if (expected_high, expected_low) != (actual_high, actual_low) {
        return Err(ClickhouseError::ProtocolError(
            "compressed block checksum mismatch".to_string(),
        ));
    }
    let algo = body[0];
    let uncompressed_size =
        u32::from_le_bytes(body[5..9].try_into().unwrap()) as usize;
    let payload = &body[FRAME_HEADER_SIZE..];

    let start = out.len();
    match CompressionMethod::from_byte(algo) {
        Some(CompressionMethod::None) => {
            out.extend_from_slice(payload);
        }
        Some(CompressionMethod::Lz4) => {
            out.resize(start + uncompressed_size, 0);
            let written = unsafe {
                lz4::liblz4::LZ4_decompress_safe(
                    payload.as_ptr() as *const i8,
                    out[start..].as_mut_ptr() as *mut i8,
                    payload.len() as i32,
                    uncompressed_size as i32,
                )
            };
            if written < 0 || written as usize != uncompressed_size {
                return Err(ClickhouseError::ProtocolError(
                    "malformed lz4 block".to_string(),
                ));
            }
        }
        Some(CompressionMethod::Zstd) => {
            let decompressed = zstd::bulk::decompress(payload, uncompressed_size)
                .map_err(|e| ClickhouseError::ProtocolError(format!("malformed zstd block: {e}")))?;
            if decompressed.len() != uncompressed_size {
                return Err(ClickhouseError::ProtocolError(
                    "zstd block size mismatch".to_string(),
                ));
            }
            out.extend_from_slice(&decompressed);
        }
        None => {
            return Err(ClickhouseError::ProtocolError(format!(
                "unknown compression algorithm byte: 0x{algo:02X}"
            )))
        }
    }
    Ok(())
}

/// Compress `raw` into one full frame, checksum included.
#[cfg(feature = "compression")]
pub fn compress_frame(method: CompressionMethod, raw: &[u8]) -> Result<Vec<u8>> {
    let compressed = match method {
        CompressionMethod::None => {
            return Err(ClickhouseError::SerializeError(
                "cannot write a compressed frame without a compression method".to_string(),
            ))
        }
        CompressionMethod::Lz4 => {
            let mut compressed = vec![0u8; raw.len() + (raw.len() / 255) + 16 + 1];
            let written = unsafe {
                lz4::liblz4::LZ4_compress_default(
                    raw.as_ptr() as *const i8,
                    compressed.as_mut_ptr() as *mut i8,
                    raw.len() as i32,
                    compressed.len() as i32,
                )
            };
            if written <= 0 {
                return Err(ClickhouseError::SerializeError(
                    "lz4 compression failed".to_string(),
                ));
            }
            compressed.truncate(written as usize);
            compressed
        }
        CompressionMethod::Zstd => zstd::bulk::compress(raw, 0)
            .map_err(|e| ClickhouseError::SerializeError(format!("zstd compression failed: {e}")))?,
    };

    let mut frame = Vec::with_capacity(FRAME_CHECKSUM_SIZE + FRAME_HEADER_SIZE + compressed.len());
    frame.extend_from_slice(&[0u8; FRAME_CHECKSUM_SIZE]);
    frame.push(method.byte());
    frame.extend_from_slice(&((compressed.len() + FRAME_HEADER_SIZE) as u32).to_le_bytes());
    frame.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    frame.extend_from_slice(&compressed);

    let (high, low) = checksum(&frame[FRAME_CHECKSUM_SIZE..]);
    frame[..8].copy_from_slice(&high.to_le_bytes());
    frame[8..16].copy_from_slice(&low.to_le_bytes());
    Ok(frame)
}

#[cfg(all(test, feature = "compression"))]
mod tests {
    use super::*;

    #[test]
    fn lz4_frame_roundtrip() {
        let raw = b"the quick brown fox jumps over the lazy dog, repeatedly, repeatedly";
        let frame = compress_frame(CompressionMethod::Lz4, raw).unwrap();

        let mut cursor = ScanCursor::over_slice(&frame);
        assert_eq!(scan_frame(&mut cursor).unwrap(), frame.len());

        let mut out = Vec::new();
        decompress_frame(&frame, &mut out).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn zstd_frame_roundtrip() {
        let raw = vec![42u8; 4096];
        let frame = compress_frame(CompressionMethod::Zstd, &raw).unwrap();
        let mut out = Vec::new();
        decompress_frame(&frame, &mut out).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let raw = b"payload bytes";
        let mut frame = compress_frame(CompressionMethod::Lz4, raw).unwrap();
        frame[3] ^= 0xFF;
        let mut out = Vec::new();
        let err = decompress_frame(&frame, &mut out).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn partial_frame_scans_incomplete() {
        let raw = b"some block bytes to compress";
        let frame = compress_frame(CompressionMethod::Lz4, raw).unwrap();
        for cut in [0, 5, 16, 17, 24, frame.len() - 1] {
            let mut cursor = ScanCursor::over_slice(&frame[..cut]);
            assert!(matches!(
                scan_frame(&mut cursor),
                Err(crate::buffer::ScanError::Incomplete)
            ));
        }
    }
}
