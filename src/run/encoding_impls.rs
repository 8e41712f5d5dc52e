//! Wire-format implementations for the run header and footer.

use crate::encoding::{Decode, Encode, EncodingError};

use super::{RunFooter, RunHeader};

impl Encode for RunHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.version.encode_to(buf)?;
        self.crc.encode_to(buf)
    }
}

impl Decode for RunHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (magic, mut off) = <[u8; 4]>::decode_from(buf)?;
        let (version, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (crc, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                magic,
                version,
                crc,
            },
            off,
        ))
    }
}

impl Encode for RunFooter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.block_count.encode_to(buf)?;
        self.stmt_count.encode_to(buf)?;
        self.min_lsn.encode_to(buf)?;
        self.max_lsn.encode_to(buf)?;
        self.crc.encode_to(buf)
    }
}

impl Decode for RunFooter {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (magic, mut off) = <[u8; 4]>::decode_from(buf)?;
        let (block_count, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (stmt_count, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (min_lsn, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (max_lsn, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (crc, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                magic,
                block_count,
                stmt_count,
                min_lsn,
                max_lsn,
                crc,
            },
            off,
        ))
    }
}
