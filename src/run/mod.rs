//! # Run Files
//!
//! An immutable, sorted, on-disk file of encoded statements — the input
//! and output medium of a dump or compaction merge.
//!
//! ## File layout
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ Header   [magic][version][crc32]           │
//! ├────────────────────────────────────────────┤
//! │ Block 0  [u32 len][u32 crc32][cells…]      │
//! │ Block 1  [u32 len][u32 crc32][cells…]      │
//! │ …                                          │
//! ├────────────────────────────────────────────┤
//! │ Footer   [magic][block_count][stmt_count]  │
//! │          [min_lsn][max_lsn][crc32]         │
//! └────────────────────────────────────────────┘
//! ```
//!
//! Each block holds ~4 KiB of concatenated statement cells (see
//! [`crate::stmt`] for the cell layout) and carries its own CRC32, so a
//! flipped byte is detected at read time rather than surfacing as a
//! nonsense statement.
//!
//! ## Access pattern
//!
//! Runs are written front to back by [`RunWriter`] (with a `.tmp` →
//! rename dance so a crash cannot leave a half-written run behind) and
//! read strictly sequentially by [`RunStream`] over a memory map. There
//! is no block index and no point-lookup path: the merge consumes whole
//! runs in order.

#[cfg(test)]
mod tests;

mod encoding_impls;

use std::fs::{File, OpenOptions, rename};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, info};

use crate::encoding::{self, EncodingError};
use crate::stmt::{KeyDef, Statement, merge_order};
use crate::stream::{HeldStmt, StmtStream, StreamError};

// ------------------------------------------------------------------------------------------------
// Format constants
// ------------------------------------------------------------------------------------------------

const RUN_HDR_MAGIC: [u8; 4] = *b"VRN0";
const RUN_FTR_MAGIC: [u8; 4] = *b"VRNF";
const RUN_FORMAT_VERSION: u32 = 1;

/// Encoded header size: magic + version + crc.
const RUN_HDR_SIZE: usize = 12;

/// Encoded footer size: magic + 4×u64 + crc.
const RUN_FTR_SIZE: usize = 40;

/// Target payload size of one data block.
const RUN_BLOCK_MAX_SIZE: usize = 4096;

/// Per-block framing: payload length + payload crc.
const RUN_BLOCK_FRAME_SIZE: usize = 8;

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

/// Errors raised by run reading and writing.
#[derive(Debug, Error)]
pub enum RunError {
    /// Underlying filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cell or on-disk struct failed to encode or decode.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Structural damage: bad magic, failed checksum, truncation,
    /// impossible offsets.
    #[error("corrupt run: {0}")]
    Corrupt(String),

    /// A statement was pushed out of merge order.
    #[error("statement pushed out of merge order (key must be non-decreasing)")]
    Unsorted,
}

// ------------------------------------------------------------------------------------------------
// On-disk structs
// ------------------------------------------------------------------------------------------------

/// Fixed-size run file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunHeader {
    pub(crate) magic: [u8; 4],
    pub(crate) version: u32,
    pub(crate) crc: u32,
}

impl RunHeader {
    fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.magic);
        hasher.update(&self.version.to_le_bytes());
        hasher.finalize()
    }
}

/// Fixed-size run file footer, written last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunFooter {
    pub(crate) magic: [u8; 4],
    pub(crate) block_count: u64,
    pub(crate) stmt_count: u64,
    pub(crate) min_lsn: u64,
    pub(crate) max_lsn: u64,
    pub(crate) crc: u32,
}

impl RunFooter {
    fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.magic);
        hasher.update(&self.block_count.to_le_bytes());
        hasher.update(&self.stmt_count.to_le_bytes());
        hasher.update(&self.min_lsn.to_le_bytes());
        hasher.update(&self.max_lsn.to_le_bytes());
        hasher.finalize()
    }
}

// ------------------------------------------------------------------------------------------------
// RunWriter
// ------------------------------------------------------------------------------------------------

/// Counters reported by [`RunWriter::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Statements written.
    pub stmt_count: u64,
    /// Data blocks written.
    pub block_count: u64,
}

/// Streaming run builder.
///
/// Statements must be pushed in merge order; the writer rejects
/// regressions. Nothing is visible at the final path until [`finish`]
/// succeeds: cells are written to `<path>.tmp`, fsynced, and renamed
/// into place.
///
/// [`finish`]: RunWriter::finish
pub struct RunWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    key_def: Arc<KeyDef>,
    block: Vec<u8>,
    last: Option<Statement>,
    block_count: u64,
    stmt_count: u64,
    min_lsn: u64,
    max_lsn: u64,
}

impl RunWriter {
    /// Creates the `.tmp` file and writes the header.
    pub fn create(path: impl AsRef<Path>, key_def: Arc<KeyDef>) -> Result<Self, RunError> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = tmp_path_for(&path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(file);

        let mut header = RunHeader {
            magic: RUN_HDR_MAGIC,
            version: RUN_FORMAT_VERSION,
            crc: 0,
        };
        header.crc = header.checksum();
        file.write_all(&encoding::encode_to_vec(&header)?)?;

        Ok(Self {
            path,
            tmp_path,
            file,
            key_def,
            block: Vec::with_capacity(RUN_BLOCK_MAX_SIZE),
            last: None,
            block_count: 0,
            stmt_count: 0,
            min_lsn: u64::MAX,
            max_lsn: 0,
        })
    }

    /// Appends one statement. Keys must be non-decreasing in merge order.
    pub fn push(&mut self, stmt: &Statement) -> Result<(), RunError> {
        if let Some(last) = &self.last {
            if merge_order(&self.key_def, last, stmt) == std::cmp::Ordering::Greater {
                return Err(RunError::Unsorted);
            }
        }
        encoding::Encode::encode_to(stmt, &mut self.block)?;
        self.last = Some(stmt.clone());
        self.stmt_count += 1;
        self.min_lsn = self.min_lsn.min(stmt.lsn());
        self.max_lsn = self.max_lsn.max(stmt.lsn());
        if self.block.len() >= RUN_BLOCK_MAX_SIZE {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<(), RunError> {
        if self.block.is_empty() {
            return Ok(());
        }
        let len = u32::try_from(self.block.len()).map_err(|_| {
            RunError::Corrupt(format!("block payload of {} bytes", self.block.len()))
        })?;
        self.file.write_all(&len.to_le_bytes())?;
        self.file
            .write_all(&crc32fast::hash(&self.block).to_le_bytes())?;
        self.file.write_all(&self.block)?;
        self.block.clear();
        self.block_count += 1;
        Ok(())
    }

    /// Flushes the last block, writes the footer, fsyncs, and atomically
    /// renames the `.tmp` file to the final path.
    pub fn finish(mut self) -> Result<RunSummary, RunError> {
        self.flush_block()?;

        let mut footer = RunFooter {
            magic: RUN_FTR_MAGIC,
            block_count: self.block_count,
            stmt_count: self.stmt_count,
            min_lsn: if self.stmt_count == 0 { 0 } else { self.min_lsn },
            max_lsn: self.max_lsn,
            crc: 0,
        };
        footer.crc = footer.checksum();
        self.file.write_all(&encoding::encode_to_vec(&footer)?)?;

        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        rename(&self.tmp_path, &self.path)?;

        info!(
            path = %self.path.display(),
            stmts = self.stmt_count,
            blocks = self.block_count,
            "run written"
        );
        Ok(RunSummary {
            stmt_count: self.stmt_count,
            block_count: self.block_count,
        })
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

// ------------------------------------------------------------------------------------------------
// Run (reader)
// ------------------------------------------------------------------------------------------------

/// An opened, validated run file.
pub struct Run {
    mmap: Mmap,
    footer: RunFooter,
    data_start: usize,
    data_end: usize,
}

impl Run {
    /// Opens a run file, memory-maps it, and validates header and footer.
    ///
    /// # Safety of the mmap
    ///
    /// Uses `unsafe { Mmap::map(..) }`; run files are immutable once
    /// renamed into place and never truncated while open, so the mapping
    /// stays valid for the life of the `Run`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RunError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < RUN_HDR_SIZE + RUN_FTR_SIZE {
            return Err(RunError::Corrupt(format!(
                "file of {} bytes is smaller than header + footer",
                mmap.len()
            )));
        }

        let (header, _) = encoding::decode_from_slice::<RunHeader>(&mmap[..RUN_HDR_SIZE])?;
        if header.magic != RUN_HDR_MAGIC {
            return Err(RunError::Corrupt("header magic mismatch".into()));
        }
        if header.version != RUN_FORMAT_VERSION {
            return Err(RunError::Corrupt(format!(
                "unsupported format version {}",
                header.version
            )));
        }
        if header.crc != header.checksum() {
            return Err(RunError::Corrupt("header checksum mismatch".into()));
        }

        let footer_off = mmap.len() - RUN_FTR_SIZE;
        let (footer, _) = encoding::decode_from_slice::<RunFooter>(&mmap[footer_off..])?;
        if footer.magic != RUN_FTR_MAGIC {
            return Err(RunError::Corrupt("footer magic mismatch".into()));
        }
        if footer.crc != footer.checksum() {
            return Err(RunError::Corrupt("footer checksum mismatch".into()));
        }

        debug!(
            path = %path.display(),
            stmts = footer.stmt_count,
            blocks = footer.block_count,
            "run opened"
        );
        Ok(Self {
            mmap,
            footer,
            data_start: RUN_HDR_SIZE,
            data_end: footer_off,
        })
    }

    /// Statements stored in this run.
    pub fn stmt_count(&self) -> u64 {
        self.footer.stmt_count
    }

    /// Data blocks stored in this run.
    pub fn block_count(&self) -> u64 {
        self.footer.block_count
    }

    /// Smallest LSN stored in this run (0 for an empty run).
    pub fn min_lsn(&self) -> u64 {
        self.footer.min_lsn
    }

    /// Largest LSN stored in this run.
    pub fn max_lsn(&self) -> u64 {
        self.footer.max_lsn
    }

    /// Reads and CRC-verifies the block at `offset`, returning its payload
    /// and the offset of the following block.
    fn read_block(&self, offset: usize) -> Result<(&[u8], usize), RunError> {
        if offset + RUN_BLOCK_FRAME_SIZE > self.data_end {
            return Err(RunError::Corrupt(format!(
                "block frame at {offset} runs past the data area"
            )));
        }
        let (len, n) = encoding::decode_from_slice::<u32>(&self.mmap[offset..])?;
        let (crc, m) = encoding::decode_from_slice::<u32>(&self.mmap[offset + n..])?;
        let payload_off = offset + n + m;
        let payload_end = payload_off + len as usize;
        if payload_end > self.data_end {
            return Err(RunError::Corrupt(format!(
                "block payload of {len} bytes at {payload_off} runs past the data area"
            )));
        }
        let payload = &self.mmap[payload_off..payload_end];
        if crc32fast::hash(payload) != crc {
            return Err(RunError::Corrupt(format!(
                "block checksum mismatch at offset {offset}"
            )));
        }
        Ok((payload, payload_end))
    }
}

// ------------------------------------------------------------------------------------------------
// DecodeContext
// ------------------------------------------------------------------------------------------------

/// Reusable scratch state for decoding run blocks.
///
/// One context serves one [`RunStream`]; callers that merge many runs can
/// pass a fresh context per source. Block payloads are copied in before
/// decoding, so decoded statements never borrow the mapping.
#[derive(Debug, Default)]
pub struct DecodeContext {
    scratch: Vec<u8>,
}

impl DecodeContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }
}

// ------------------------------------------------------------------------------------------------
// RunStream
// ------------------------------------------------------------------------------------------------

/// Sequential merge-order stream over an opened [`Run`].
///
/// Yields [`HeldStmt::Owned`] statements decoded block by block through
/// the stream's [`DecodeContext`].
pub struct RunStream {
    run: Arc<Run>,
    ctx: DecodeContext,
    /// Offset of the next block frame inside the mapping.
    next_block: usize,
    /// Decode position within the scratch buffer.
    cursor: usize,
    blocks_read: u64,
    yielded: u64,
}

impl RunStream {
    /// Opens a stream at the first block of `run`.
    pub fn open(run: Arc<Run>, ctx: DecodeContext) -> Self {
        let next_block = run.data_start;
        Self {
            run,
            ctx,
            next_block,
            cursor: 0,
            blocks_read: 0,
            yielded: 0,
        }
    }

    fn load_next_block(&mut self) -> Result<bool, RunError> {
        if self.blocks_read == self.run.block_count() {
            if self.next_block != self.run.data_end {
                return Err(RunError::Corrupt(format!(
                    "{} trailing bytes after the last block",
                    self.run.data_end - self.next_block
                )));
            }
            if self.yielded != self.run.stmt_count() {
                return Err(RunError::Corrupt(format!(
                    "footer promises {} statements, found {}",
                    self.run.stmt_count(),
                    self.yielded
                )));
            }
            return Ok(false);
        }
        let (payload, next) = self.run.read_block(self.next_block)?;
        self.ctx.scratch.clear();
        self.ctx.scratch.extend_from_slice(payload);
        self.cursor = 0;
        self.next_block = next;
        self.blocks_read += 1;
        Ok(true)
    }
}

impl StmtStream for RunStream {
    fn next(&mut self) -> Result<Option<HeldStmt>, StreamError> {
        loop {
            if self.cursor < self.ctx.scratch.len() {
                let (stmt, n) = encoding::decode_from_slice::<Statement>(
                    &self.ctx.scratch[self.cursor..],
                )
                .map_err(RunError::from)?;
                self.cursor += n;
                self.yielded += 1;
                return Ok(Some(HeldStmt::Owned(stmt)));
            }
            if !self.load_next_block()? {
                return Ok(None);
            }
        }
    }
}
