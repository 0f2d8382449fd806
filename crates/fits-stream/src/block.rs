use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte used for data blocks (zero).
pub const DATA_PAD_BYTE: u8 = 0x00;

/// Returns the number of FITS blocks required to hold `num_bytes` bytes.
///
/// A FITS stream is organized in units of 2880 bytes. This computes the
/// ceiling division: 0 bytes requires 0 blocks, 1 byte requires 1 block,
/// 2880 bytes requires 1 block, 2881 bytes requires 2 blocks, etc.
pub const fn blocks_needed(num_bytes: u64) -> u64 {
    if num_bytes == 0 {
        return 0;
    }
    num_bytes.div_ceil(BLOCK_SIZE as u64)
}

/// Returns the total byte length (in whole blocks) required to hold
/// `num_bytes`. This is simply `blocks_needed(num_bytes) * BLOCK_SIZE`.
pub const fn padded_byte_len(num_bytes: u64) -> u64 {
    blocks_needed(num_bytes) * BLOCK_SIZE as u64
}

/// Shared handle to the underlying byte source.
///
/// Every consumer of the stream (the block reader during parsing, the data
/// units afterwards) goes through the same lock, so reads against one source
/// are serialized.
pub type SharedSource<R> = Arc<Mutex<R>>;

pub(crate) fn lock_source<R>(src: &Mutex<R>) -> MutexGuard<'_, R> {
    match src.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reads exactly `buf.len()` bytes at `offset`, without consuming the shared
/// reader's notion of position for anyone else.
pub(crate) fn read_exact_at<R: Read + Seek>(
    src: &Mutex<R>,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    let mut guard = lock_source(src);
    guard.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        match guard.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::TruncatedStream {
                    offset,
                    needed: buf.len() - filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Pull-based reader that hands out the stream one 2880-byte block at a time.
///
/// `next_block` blocks on the underlying source until a whole block is
/// available; a source that ends exactly on a block boundary yields
/// `Ok(None)`, while one that ends mid-block is reported as a truncated
/// stream with the offset and the missing byte count.
pub struct BlockReader<R> {
    src: SharedSource<R>,
    offset: u64,
}

impl<R: Read + Seek> BlockReader<R> {
    pub fn new(src: SharedSource<R>) -> Self {
        BlockReader { src, offset: 0 }
    }

    /// Current byte offset, always a multiple of `BLOCK_SIZE`.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Repositions the reader. `offset` must be block-aligned.
    pub fn seek_to(&mut self, offset: u64) {
        debug_assert_eq!(offset % BLOCK_SIZE as u64, 0);
        self.offset = offset;
    }

    /// Reads the next whole block, or `None` at a clean end of stream.
    pub fn next_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let start = self.offset;
        let mut guard = lock_source(&self.src);
        guard.seek(SeekFrom::Start(start))?;
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match guard.read(&mut block[filled..]) {
                Ok(0) => {
                    if filled == 0 {
                        return Ok(None);
                    }
                    return Err(Error::TruncatedStream {
                        offset: start,
                        needed: BLOCK_SIZE - filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        drop(guard);
        self.offset = start + BLOCK_SIZE as u64;
        Ok(Some(block))
    }
}
