use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::pool::{BufferPool, PooledBuffer};
use crate::protocol::MAX_STRING_SIZE;
use crate::{ClickhouseError, Result};

const SEGMENT_SIZE: usize = 16 * 1024;

/// Outcome of a scan-side read. `Incomplete` is a sentinel, not a failure:
/// it sends the caller back to the buffer pump for more bytes, after which
/// the scan restarts from the message start.
#[derive(Debug)]
pub enum ScanError {
    Incomplete,
    Corrupt(ClickhouseError),
}

pub type ScanResult<T> = Result<T, ScanError>;

impl From<ClickhouseError> for ScanError {
    fn from(e: ClickhouseError) -> Self {
        ScanError::Corrupt(e)
    }
}

impl ScanError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        ScanError::Corrupt(ClickhouseError::ProtocolError(msg.into()))
    }
}

/// Append-only receive buffer fed by socket segments.
///
/// Consumption is two-phase: a `ScanCursor` walks the buffered bytes without
/// consuming them, and `advance_to(consumed, examined)` commits. The
/// `examined` cursor is the back-pressure contract: after an incomplete scan
/// examines everything buffered, `needs_pump` stays true until the pump
/// appends fresh bytes, so partial messages never busy-loop.
pub struct RecvBuffer {
    segments: VecDeque<Vec<u8>>,
    head_offset: usize,
    len: usize,
    examined: usize,
    pool: Arc<BufferPool>,
}

impl RecvBuffer {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        RecvBuffer {
            segments: VecDeque::new(),
            head_offset: 0,
            len: 0,
            examined: 0,
            pool,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn needs_pump(&self) -> bool {
        self.len <= self.examined
    }

    /// Await one more segment from the socket. EOF here means the peer hung
    /// up mid-message, which is always `UnexpectedEof` for callers that still
    /// need bytes.
    pub async fn pump<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<()> {
        let mut segment = vec![0u8; SEGMENT_SIZE];
        let n = reader.read(&mut segment[..]).await?;
        if n == 0 {
            return Err(ClickhouseError::UnexpectedEof);
        }
        segment.truncate(n);
        self.len += n;
        self.segments.push_back(segment);
        Ok(())
    }

    pub fn cursor(&self) -> ScanCursor<'_> {
        ScanCursor {
            source: Source::Segments(&self.segments),
            seg: 0,
            off: self.head_offset,
            remaining: self.len,
            consumed: 0,
        }
    }

    /// Commit `consumed` bytes and record that the scan looked at everything
    /// up to `examined` (both relative to the current stream position).
    pub fn advance_to(&mut self, consumed: usize, examined: usize) {
        debug_assert!(consumed <= examined && examined <= self.len);
        self.examined = examined - consumed;
        self.len -= consumed;
        let mut remaining = consumed;
        while remaining > 0 {
            let head_len = self.segments[0].len() - self.head_offset;
            if remaining >= head_len {
                self.segments.pop_front();
                self.head_offset = 0;
                remaining -= head_len;
            } else {
                self.head_offset += remaining;
                remaining = 0;
            }
        }
    }

    /// The next `len` bytes of the stream as one contiguous run: borrowed
    /// straight from the head segment when they already are, otherwise copied
    /// once into pooled scratch.
    pub fn view(&self, len: usize) -> MessageBytes<'_> {
        debug_assert!(len <= self.len);
        let head = &self.segments[0][self.head_offset..];
        if head.len() >= len {
            return MessageBytes::Borrowed(&head[..len]);
        }
        let mut scratch = self.pool.rent(len);
        scratch.extend_from_slice(head);
        let mut needed = len - head.len();
        for segment in self.segments.iter().skip(1) {
            let take = needed.min(segment.len());
            scratch.extend_from_slice(&segment[..take]);
            needed -= take;
            if needed == 0 {
                break;
            }
        }
        MessageBytes::Pooled(scratch)
    }

    #[cfg(test)]
    pub(crate) fn push_segment(&mut self, segment: Vec<u8>) {
        self.len += segment.len();
        self.segments.push_back(segment);
    }
}

pub enum MessageBytes<'a> {
    Borrowed(&'a [u8]),
    Pooled(PooledBuffer),
}

impl AsRef<[u8]> for MessageBytes<'_> {
    fn as_ref(&self) -> &[u8] {
        match self {
            MessageBytes::Borrowed(x) => x,
            MessageBytes::Pooled(x) => &x[..],
        }
    }
}

#[derive(Clone, Copy)]
enum Source<'a> {
    Segments(&'a VecDeque<Vec<u8>>),
    Slice(&'a [u8]),
}

/// Non-consuming cursor over buffered bytes, possibly spanning segment
/// boundaries. All reads report `Incomplete` when they would run past the
/// buffered end; nothing here allocates except `read_string_bytes` on a
/// string that straddles segments.
#[derive(Clone)]
pub struct ScanCursor<'a> {
    source: Source<'a>,
    seg: usize,
    off: usize,
    remaining: usize,
    consumed: usize,
}

impl<'a> ScanCursor<'a> {
    pub fn over_slice(data: &'a [u8]) -> Self {
        ScanCursor {
            source: Source::Slice(data),
            seg: 0,
            off: 0,
            remaining: data.len(),
            consumed: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    fn chunk(&self) -> &'a [u8] {
        match self.source {
            Source::Slice(data) => {
                if self.seg > 0 {
                    &[]
                } else {
                    &data[self.off..]
                }
            }
            Source::Segments(segments) => match segments.get(self.seg) {
                Some(segment) => &segment[self.off..],
                None => &[],
            },
        }
    }

    fn step(&mut self, n: usize) {
        debug_assert!(n <= self.remaining);
        let mut left = n;
        while left > 0 {
            let chunk_len = self.chunk().len();
            if left < chunk_len {
                self.off += left;
                left = 0;
            } else {
                left -= chunk_len;
                self.seg += 1;
                self.off = 0;
            }
        }
        self.remaining -= n;
        self.consumed += n;
    }

    pub fn skip(&mut self, n: usize) -> ScanResult<()> {
        if n > self.remaining {
            return Err(ScanError::Incomplete);
        }
        self.step(n);
        Ok(())
    }

    /// Look at a byte `offset` past the current position without consuming.
    pub fn peek_byte(&self, offset: usize) -> ScanResult<u8> {
        if offset >= self.remaining {
            return Err(ScanError::Incomplete);
        }
        let mut probe = self.clone();
        probe.step(offset);
        Ok(probe.chunk()[0])
    }

    pub fn read_u8(&mut self) -> ScanResult<u8> {
        if self.remaining == 0 {
            return Err(ScanError::Incomplete);
        }
        let byte = self.chunk()[0];
        self.step(1);
        Ok(byte)
    }

    pub fn read_fixed<const N: usize>(&mut self) -> ScanResult<[u8; N]> {
        if N > self.remaining {
            return Err(ScanError::Incomplete);
        }
        let mut out = [0u8; N];
        let mut filled = 0;
        while filled < N {
            let chunk = self.chunk();
            let take = chunk.len().min(N - filled);
            out[filled..filled + take].copy_from_slice(&chunk[..take]);
            self.step(take);
            filled += take;
        }
        Ok(out)
    }

    pub fn read_u32_le(&mut self) -> ScanResult<u32> {
        Ok(u32::from_le_bytes(self.read_fixed::<4>()?))
    }

    pub fn read_u64_le(&mut self) -> ScanResult<u64> {
        Ok(u64::from_le_bytes(self.read_fixed::<8>()?))
    }

    pub fn read_var_uint(&mut self) -> ScanResult<u64> {
        let mut out = 0u64;
        for i in 0..10u64 {
            let octet = self.read_u8()?;
            out |= ((octet & 0x7F) as u64) << (7 * i);
            if (octet & 0x80) == 0 {
                break;
            }
        }
        Ok(out)
    }

    fn string_len(&mut self) -> ScanResult<usize> {
        let len = self.read_var_uint()?;
        if len as usize > MAX_STRING_SIZE {
            return Err(ScanError::corrupt(format!(
                "string too large: {} > {}",
                len, MAX_STRING_SIZE
            )));
        }
        Ok(len as usize)
    }

    pub fn try_skip_string(&mut self) -> ScanResult<()> {
        let len = self.string_len()?;
        self.skip(len)
    }

    /// String payload, borrowed when it sits inside one segment.
    pub fn read_string_bytes(&mut self) -> ScanResult<Cow<'a, [u8]>> {
        let len = self.string_len()?;
        if len > self.remaining {
            return Err(ScanError::Incomplete);
        }
        let chunk = self.chunk();
        if chunk.len() >= len {
            let out = &chunk[..len];
            self.step(len);
            return Ok(Cow::Borrowed(out));
        }
        let mut out = Vec::with_capacity(len);
        let mut left = len;
        while left > 0 {
            let chunk = self.chunk();
            let take = chunk.len().min(left);
            out.extend_from_slice(&chunk[..take]);
            self.step(take);
            left -= take;
        }
        Ok(Cow::Owned(out))
    }

    pub fn read_utf8(&mut self) -> ScanResult<Cow<'a, str>> {
        match self.read_string_bytes()? {
            Cow::Borrowed(bytes) => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| ScanError::corrupt(format!("invalid utf-8 string: {e}"))),
            Cow::Owned(bytes) => String::from_utf8(bytes)
                .map(Cow::Owned)
                .map_err(|e| ScanError::corrupt(format!("invalid utf-8 string: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(splits: &[&[u8]]) -> RecvBuffer {
        let mut buf = RecvBuffer::new(BufferPool::new());
        for split in splits {
            buf.push_segment(split.to_vec());
        }
        buf
    }

    #[test]
    fn cursor_reads_across_segments() {
        let buf = buffer_with(&[&[0x96], &[0x01, 0xAB], &[0xCD, 0x12, 0x34]]);
        let mut cur = buf.cursor();
        assert_eq!(cur.read_var_uint().unwrap(), 150);
        assert_eq!(cur.read_fixed::<2>().unwrap(), [0xAB, 0xCD]);
        assert_eq!(cur.read_u8().unwrap(), 0x12);
        assert_eq!(cur.remaining(), 1);
        assert_eq!(cur.consumed(), 5);
    }

    #[test]
    fn peek_does_not_consume() {
        let buf = buffer_with(&[&[1, 2], &[3, 4]]);
        let cur = buf.cursor();
        assert_eq!(cur.peek_byte(0).unwrap(), 1);
        assert_eq!(cur.peek_byte(3).unwrap(), 4);
        assert!(matches!(cur.peek_byte(4), Err(ScanError::Incomplete)));
        assert_eq!(cur.consumed(), 0);
    }

    #[test]
    fn incomplete_string_is_sentinel_not_error() {
        // length prefix says 5 bytes but only 2 arrived
        let buf = buffer_with(&[&[5, b'a'], &[b'b']]);
        let mut cur = buf.cursor();
        assert!(matches!(cur.try_skip_string(), Err(ScanError::Incomplete)));
    }

    #[test]
    fn string_borrowed_within_segment_copied_across() {
        let buf = buffer_with(&[&[3, b'a', b'b', b'c', 3, b'x'], &[b'y', b'z']]);
        let mut cur = buf.cursor();
        assert!(matches!(
            cur.read_string_bytes().unwrap(),
            Cow::Borrowed(b"abc")
        ));
        match cur.read_string_bytes().unwrap() {
            Cow::Owned(bytes) => assert_eq!(bytes, b"xyz"),
            Cow::Borrowed(_) => panic!("straddling string should copy"),
        }
    }

    #[test]
    fn advance_to_tracks_examined_watermark() {
        let mut buf = buffer_with(&[&[1, 2, 3, 4]]);
        assert!(!buf.needs_pump());
        // scanned everything, consumed nothing: wait for more bytes
        buf.advance_to(0, 4);
        assert!(buf.needs_pump());
        buf.push_segment(vec![5]);
        assert!(!buf.needs_pump());
        // consume the first message
        buf.advance_to(3, 5);
        assert_eq!(buf.len(), 2);
        let mut cur = buf.cursor();
        assert_eq!(cur.read_fixed::<2>().unwrap(), [4, 5]);
    }

    #[test]
    fn view_borrows_contiguous_and_copies_fragmented() {
        let mut buf = buffer_with(&[&[1, 2, 3], &[4, 5]]);
        assert!(matches!(buf.view(3), MessageBytes::Borrowed(&[1, 2, 3])));
        let fragmented = buf.view(5);
        assert_eq!(fragmented.as_ref(), &[1, 2, 3, 4, 5]);
        assert!(matches!(fragmented, MessageBytes::Pooled(_)));
        drop(fragmented);
        buf.advance_to(4, 4);
        assert!(matches!(buf.view(1), MessageBytes::Borrowed(&[5])));
    }
}
