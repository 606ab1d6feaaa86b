//! Sparse address-to-byte store backed by Intel-HEX files
//!
//! A [`HexImage`] holds an ordered sequence of [`Block`]s, each a contiguous
//! byte run at an absolute 32-bit address. Blocks may arrive in any order and
//! need not be contiguous; [`HexImage::canonicalize`] sorts and coalesces
//! them. All higher layers (application image, firmware bootstrap) reshape,
//! clip and flatten images through this type.

use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::hex::record::{HexRecord, RecordType};

/// Byte order for scalar reads out of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Most significant byte first
    Big,
    /// Least significant byte first
    Little,
}

/// A contiguous run of bytes at an absolute address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Absolute address of the first byte
    pub base_address: u32,
    /// The bytes themselves (never empty in a canonical image)
    pub data: Vec<u8>,
}

impl Block {
    /// One past the last address covered by this block.
    pub fn end_address(&self) -> u32 {
        self.base_address + self.data.len() as u32
    }

    /// Number of bytes in the block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sparse address→byte map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexImage {
    blocks: Vec<Block>,
}

impl HexImage {
    /// An image with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// The blocks in their current order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Append a block. Empty data is ignored.
    pub fn add(&mut self, address: u32, data: impl Into<Vec<u8>>) {
        let data = data.into();
        if !data.is_empty() {
            self.blocks.push(Block {
                base_address: address,
                data,
            });
        }
    }

    /// Total number of data bytes across all blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    /// Whether the image holds no data at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Parse a complete hex file from a string.
    ///
    /// `default_base` seeds the upper address bits and only matters for
    /// snippet files that carry data records before any extended address
    /// record. Start-address records are parsed and discarded; an end record
    /// stops parsing.
    pub fn parse_str(text: &str, default_base: u32) -> Result<Self> {
        let mut image = HexImage::new();
        let mut high_address = default_base;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let record = HexRecord::parse(line, line_no)?;
            match record.record_type {
                RecordType::Data => {
                    let address = high_address + record.offset as u32;
                    // extend the previous block when the data is contiguous
                    match image.blocks.last_mut() {
                        Some(last) if last.end_address() == address => {
                            last.data.extend_from_slice(&record.payload);
                        }
                        _ => image.add(address, record.payload),
                    }
                }
                RecordType::End => break,
                RecordType::ExtSegAddr => {
                    high_address = record_value(&record, line_no)? << 4;
                }
                RecordType::ExtLinAddr => {
                    high_address = record_value(&record, line_no)? << 16;
                }
                // start addresses are irrelevant for NV programming
                RecordType::StartSegAddr | RecordType::StartLinAddr => {}
            }
        }

        Ok(image)
    }

    /// Parse a hex file from disk.
    pub fn read_file(path: impl AsRef<Path>, default_base: u32) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&text, default_base)
    }

    /// Emit the image as hex file text.
    ///
    /// `width` 0 writes each block as a single record (the block must fit the
    /// 8-bit count field); 1..=255 reshapes first so no record exceeds
    /// `width` bytes. An extended linear address record is inserted whenever
    /// a block's upper 16 address bits differ from the running high address,
    /// and the output is terminated with an end record.
    pub fn to_hex(&self, width: usize) -> Result<String> {
        let mut out = String::new();
        let mut high_address = 0u32;
        self.emit_data(&mut out, width, &mut high_address)?;
        out.push_str(&HexRecord::end().encode());
        out.push('\n');
        Ok(out)
    }

    /// Write the image to a hex file on disk.
    pub fn write_file(&self, path: impl AsRef<Path>, width: usize) -> Result<()> {
        let path = path.as_ref();
        let text = self.to_hex(width)?;
        std::fs::write(path, text).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Emit only the data (and extended-address) records, tracking the
    /// running high address across calls. Used by the application image to
    /// interleave several regions into one file before the end record.
    pub(crate) fn emit_data(
        &self,
        out: &mut String,
        width: usize,
        high_address: &mut u32,
    ) -> Result<()> {
        if width > 255 {
            return Err(Error::Range {
                what: "hex record width",
                len: width,
                max: 255,
            });
        }

        let shaped;
        let blocks = if width == 0 {
            &self.blocks
        } else {
            shaped = self.reshape(width);
            &shaped.blocks
        };

        for block in blocks {
            emit_record(
                out,
                block.base_address,
                RecordType::Data,
                &block.data,
                high_address,
            )?;
        }
        Ok(())
    }

    /// Reshape into blocks of at most `max_len` bytes (0 = unbounded).
    ///
    /// Contiguous adjacent input blocks are concatenated up to the cap; a
    /// discontinuity starts a new output block. Input order is preserved and
    /// no sorting is performed. `reshape(0)` of a sorted image is the
    /// canonical form.
    pub fn reshape(&self, max_len: usize) -> HexImage {
        let mut out = HexImage::new();
        let mut current: Option<Block> = None;

        for block in &self.blocks {
            let mut address = block.base_address;

            // discontinuity flushes the block under construction
            if let Some(cur) = current.take() {
                if cur.end_address() == address {
                    current = Some(cur);
                } else {
                    out.blocks.push(cur);
                }
            }

            for &byte in &block.data {
                let cur = current.get_or_insert_with(|| Block {
                    base_address: address,
                    data: Vec::new(),
                });
                cur.data.push(byte);
                address += 1;
                if max_len > 0 && cur.data.len() == max_len {
                    out.blocks.push(current.take().unwrap());
                }
            }
        }

        if let Some(cur) = current {
            out.blocks.push(cur);
        }
        out
    }

    /// Sorted, coalesced copy: blocks ordered by address, contiguous
    /// neighbours merged, no empty blocks.
    pub fn canonicalize(&self) -> HexImage {
        let mut sorted = HexImage::new();
        sorted.blocks = self
            .blocks
            .iter()
            .filter(|b| !b.is_empty())
            .cloned()
            .collect();
        sorted.blocks.sort_by_key(|b| b.base_address);
        sorted.reshape(0)
    }

    /// A new image holding exactly the intersection of `[start, start+len)`
    /// with each block, clipped to the range.
    pub fn extract(&self, start: u32, len: u32) -> HexImage {
        let end = start.saturating_add(len);
        let mut out = HexImage::new();

        for block in &self.blocks {
            let lo = block.base_address.max(start);
            let hi = block.end_address().min(end);
            if lo < hi {
                let from = (lo - block.base_address) as usize;
                let to = (hi - block.base_address) as usize;
                out.add(lo, block.data[from..to].to_vec());
            }
        }
        out
    }

    /// Flatten `[start, start+len)` into a dense buffer; unrepresented bytes
    /// are 0x00.
    pub fn extract_bytes(&self, start: u32, len: usize) -> Vec<u8> {
        let mut dest = vec![0u8; len];
        self.extract_bytes_into(start, &mut dest);
        dest
    }

    /// Flatten into a caller-provided buffer (zeroing it first). Bytes beyond
    /// the buffer are not written.
    pub fn extract_bytes_into(&self, start: u32, dest: &mut [u8]) {
        dest.fill(0);
        let end = start.saturating_add(dest.len() as u32);

        for block in &self.blocks {
            let lo = block.base_address.max(start);
            let hi = block.end_address().min(end);
            if lo < hi {
                let from = (lo - block.base_address) as usize;
                let n = (hi - lo) as usize;
                let off = (lo - start) as usize;
                dest[off..off + n].copy_from_slice(&block.data[from..from + n]);
            }
        }
    }

    /// Drop every block whose payload is entirely 0x00. Zero is the
    /// post-erase state of all regions handled here, so such blocks carry no
    /// information.
    pub fn trim(&mut self) {
        self.blocks.retain(|b| b.data.iter().any(|&byte| byte != 0));
    }

    /// Read a scalar of `len` bytes (at most 4) at `addr`, composing in the
    /// given byte order. Unrepresented bytes read as 0.
    pub fn uint_at(&self, addr: u32, len: usize, endian: Endian) -> u32 {
        debug_assert!(len <= 4);
        let len = len.min(4);
        let bytes = self.extract_bytes(addr, len);
        let mut value = 0u32;
        match endian {
            Endian::Little => {
                for (i, &b) in bytes.iter().enumerate() {
                    value |= (b as u32) << (8 * i);
                }
            }
            Endian::Big => {
                for &b in &bytes {
                    value = value << 8 | b as u32;
                }
            }
        }
        value
    }

    /// Lowest start and highest end address of blocks intersecting
    /// `[range_start, range_start+range_len)`, or `None` when no data falls
    /// inside the range.
    pub fn minmax_address(&self, range_start: u32, range_len: u32) -> Option<(u32, u32)> {
        let range_end = range_start.saturating_add(range_len);
        let mut result: Option<(u32, u32)> = None;

        for block in &self.blocks {
            let lo = block.base_address.max(range_start);
            let hi = block.end_address().min(range_end);
            if lo < hi {
                result = Some(match result {
                    None => (lo, hi),
                    Some((min, max)) => (min.min(lo), max.max(hi)),
                });
            }
        }
        result
    }

    /// Hex-dump the image to a writer, at most `max_bytes` per block
    /// (0 = unlimited). Diagnostic output for the `info` command.
    pub fn dump(&self, w: &mut dyn Write, max_bytes: usize) -> std::io::Result<()> {
        for block in &self.blocks {
            writeln!(
                w,
                "  block 0x{:08X}..0x{:08X} ({} bytes)",
                block.base_address,
                block.end_address(),
                block.len()
            )?;
            let shown = if max_bytes == 0 {
                block.len()
            } else {
                block.len().min(max_bytes)
            };
            for (i, chunk) in block.data[..shown].chunks(16).enumerate() {
                write!(w, "    {:08X}:", block.base_address as usize + i * 16)?;
                for b in chunk {
                    write!(w, " {:02X}", b)?;
                }
                writeln!(w)?;
            }
            if shown < block.len() {
                writeln!(w, "    ... {} more bytes", block.len() - shown)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for HexImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} block(s), {} byte(s)", self.blocks.len(), self.len())
    }
}

/// Emit one data record at an absolute address, inserting an extended linear
/// address record when the upper 16 bits change.
pub(crate) fn emit_record(
    out: &mut String,
    address: u32,
    record_type: RecordType,
    payload: &[u8],
    high_address: &mut u32,
) -> Result<()> {
    let high = address >> 16;
    if high != *high_address {
        out.push_str(&HexRecord::ext_lin_addr(high as u16).encode());
        out.push('\n');
        *high_address = high;
    }
    let record = HexRecord::new(address as u16, record_type, payload.to_vec())?;
    out.push_str(&record.encode());
    out.push('\n');
    Ok(())
}

fn record_value(record: &HexRecord, line_no: usize) -> Result<u32> {
    if record.payload.len() != 2 {
        return Err(Error::HexParse {
            line: line_no,
            reason: format!(
                "address record payload must be 2 bytes, got {}",
                record.payload.len()
            ),
        });
    }
    Ok(u16::from_be_bytes([record.payload[0], record.payload[1]]) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 256 counting bytes at 256..512, added as 32-byte blocks.
    fn counting_image() -> HexImage {
        let mut image = HexImage::new();
        for i in 0..8u32 {
            let data: Vec<u8> = (0..32).map(|j| (i * 32 + j) as u8).collect();
            image.add(256 + i * 32, data);
        }
        image
    }

    #[test]
    fn test_parse_single_record() {
        let image =
            HexImage::parse_str(":10010000214601360121470136007EFE09D2190140\n", 0).unwrap();
        assert_eq!(image.blocks().len(), 1);
        let block = &image.blocks()[0];
        assert_eq!(block.base_address, 0x0100);
        assert_eq!(block.len(), 16);
        assert_eq!(block.data[0], 0x21);
        assert_eq!(block.data[15], 0x01);
    }

    #[test]
    fn test_parse_merges_contiguous_records() {
        let mut text = String::new();
        let mut high = 0;
        emit_record(&mut text, 0x100, RecordType::Data, &[1, 2], &mut high).unwrap();
        emit_record(&mut text, 0x102, RecordType::Data, &[3, 4], &mut high).unwrap();
        let image = HexImage::parse_str(&text, 0).unwrap();
        assert_eq!(image.blocks().len(), 1);
        assert_eq!(image.blocks()[0].data, [1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_ext_lin_addr() {
        let text = ":020000040001F9\n:02000000AABB99\n:00000001FF\n";
        let image = HexImage::parse_str(text, 0).unwrap();
        assert_eq!(image.blocks().len(), 1);
        assert_eq!(image.blocks()[0].base_address, 0x0001_0000);
        assert_eq!(image.blocks()[0].data, [0xAA, 0xBB]);
    }

    #[test]
    fn test_parse_ext_seg_addr() {
        // segment 0x1000 -> linear 0x10000
        let text = ":020000021000EC\n:02000000AABB99\n";
        let image = HexImage::parse_str(text, 0).unwrap();
        assert_eq!(image.blocks()[0].base_address, 0x0001_0000);
    }

    #[test]
    fn test_parse_default_base() {
        // no address record before data: the default base applies
        let image = HexImage::parse_str(":02000000AABB99\n", 0x9040_0000).unwrap();
        assert_eq!(image.blocks()[0].base_address, 0x9040_0000);

        // an explicit address record overrides it
        let text = ":020000040001F9\n:02000000AABB99\n";
        let image = HexImage::parse_str(text, 0x9040_0000).unwrap();
        assert_eq!(image.blocks()[0].base_address, 0x0001_0000);
    }

    #[test]
    fn test_parse_stops_at_end_record() {
        let text = ":00000001FF\n:02000000AABB99\n";
        let image = HexImage::parse_str(text, 0).unwrap();
        assert!(image.is_empty());
    }

    #[test]
    fn test_emit_with_ext_lin_addr() {
        let mut image = HexImage::new();
        image.add(0x0001_0000, vec![0xAA, 0xBB]);
        let text = image.to_hex(2).unwrap();
        assert_eq!(text, ":020000040001F9\n:02000000AABB99\n:00000001FF\n");
    }

    #[test]
    fn test_emit_width_zero_single_record_per_block() {
        let mut image = HexImage::new();
        image.add(0x0000, vec![0x11; 4]);
        image.add(0x0100, vec![0x22; 4]);
        let text = image.to_hex(0).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(":04000000"));
        assert!(lines[1].starts_with(":04010000"));
        assert_eq!(lines[2], ":00000001FF");
    }

    #[test]
    fn test_roundtrip_all_widths() {
        let image = counting_image();
        let canon = image.canonicalize();
        for width in [0usize, 1, 3, 16, 255] {
            let text = image.to_hex(width).unwrap();
            let back = HexImage::parse_str(&text, 0).unwrap();
            assert_eq!(back.canonicalize(), canon, "width {}", width);
        }
    }

    #[test]
    fn test_reshape_splits_and_joins() {
        let mut image = HexImage::new();
        image.add(0x00, vec![0x00, 0x01, 0x02, 0x03]);
        image.add(0x04, vec![0x04, 0x05, 0x06, 0x07]);

        let shaped = image.reshape(3);
        let blocks = shaped.blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!((blocks[0].base_address, &blocks[0].data[..]), (0, &[0, 1, 2][..]));
        assert_eq!((blocks[1].base_address, &blocks[1].data[..]), (3, &[3, 4, 5][..]));
        assert_eq!((blocks[2].base_address, &blocks[2].data[..]), (6, &[6, 7][..]));
    }

    #[test]
    fn test_reshape_respects_discontinuity() {
        let mut image = HexImage::new();
        image.add(0x00, vec![1, 2]);
        image.add(0x10, vec![3, 4]);
        let shaped = image.reshape(0);
        assert_eq!(shaped.blocks().len(), 2);
        assert_eq!(shaped.blocks()[0].data, [1, 2]);
        assert_eq!(shaped.blocks()[1].base_address, 0x10);
    }

    #[test]
    fn test_reshape_preserves_bytes() {
        let image = counting_image();
        for width in [1usize, 5, 31, 32, 100] {
            let shaped = image.reshape(width);
            assert_eq!(
                shaped.extract_bytes(256, 256),
                image.extract_bytes(256, 256),
                "width {}",
                width
            );
        }
    }

    #[test]
    fn test_canonicalize_sorts_and_merges() {
        let mut image = HexImage::new();
        image.add(0x20, vec![3, 4]);
        image.add(0x00, vec![1, 2]);
        image.add(0x02, vec![5, 6]);
        let canon = image.canonicalize();
        assert_eq!(canon.blocks().len(), 2);
        assert_eq!(canon.blocks()[0].base_address, 0x00);
        assert_eq!(canon.blocks()[0].data, [1, 2, 5, 6]);
        assert_eq!(canon.blocks()[1].base_address, 0x20);
    }

    // extract_bytes scenarios mirror the block-clipping cases the original
    // format is known to hit: below, above, straddling either boundary,
    // exact, inside, enclosing.

    #[test]
    fn test_extract_bytes_below_and_above() {
        let image = counting_image();
        assert_eq!(image.extract_bytes(0, 256), vec![0u8; 256]);
        assert_eq!(image.extract_bytes(512, 64), vec![0u8; 64]);
    }

    #[test]
    fn test_extract_bytes_across_lower_boundary() {
        let image = counting_image();
        let data = image.extract_bytes(128, 200);
        assert!(data[..128].iter().all(|&b| b == 0));
        for i in 128..200 {
            assert_eq!(data[i], (i - 128) as u8);
        }
    }

    #[test]
    fn test_extract_bytes_across_upper_boundary() {
        let image = counting_image();
        let data = image.extract_bytes(511, 64);
        assert_eq!(data[0], 255);
        assert!(data[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_extract_bytes_exact_and_inside() {
        let image = counting_image();

        let exact = image.extract_bytes(256, 256);
        for (i, &b) in exact.iter().enumerate() {
            assert_eq!(b, i as u8);
        }

        let inside = image.extract_bytes(300, 64);
        for (i, &b) in inside.iter().enumerate() {
            assert_eq!(b, (300 - 256 + i) as u8);
        }
    }

    #[test]
    fn test_extract_bytes_enclosing() {
        let image = counting_image();
        let data = image.extract_bytes(128, 512);
        assert!(data[..128].iter().all(|&b| b == 0));
        for i in 0..256 {
            assert_eq!(data[128 + i], i as u8);
        }
        assert!(data[384..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_extract_clips_blocks() {
        let image = counting_image();
        let sub = image.extract(300, 12);
        assert_eq!(sub.blocks().len(), 1);
        assert_eq!(sub.blocks()[0].base_address, 300);
        assert_eq!(sub.blocks()[0].len(), 12);
        assert_eq!(sub.blocks()[0].data[0], (300 - 256) as u8);
    }

    #[test]
    fn test_extract_matches_flat_view() {
        let image = counting_image();
        let sub = image.extract(200, 400);
        assert_eq!(sub.extract_bytes(200, 400), image.extract_bytes(200, 400));
    }

    #[test]
    fn test_trim_drops_zero_blocks() {
        let mut image = HexImage::new();
        image.add(0x00, vec![0, 0, 0, 0]);
        image.add(0x10, vec![0, 1, 0, 0]);
        image.add(0x20, vec![0; 16]);
        image.trim();
        assert_eq!(image.blocks().len(), 1);
        assert_eq!(image.blocks()[0].base_address, 0x10);
    }

    #[test]
    fn test_uint_at() {
        let mut image = HexImage::new();
        image.add(0x100, vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(image.uint_at(0x100, 4, Endian::Big), 0x1234_5678);
        assert_eq!(image.uint_at(0x100, 4, Endian::Little), 0x7856_3412);
        assert_eq!(image.uint_at(0x100, 2, Endian::Big), 0x1234);
        assert_eq!(image.uint_at(0x102, 1, Endian::Big), 0x56);
        // absent data reads as zero
        assert_eq!(image.uint_at(0x200, 4, Endian::Big), 0);
        // partially absent: missing trailing bytes are zero
        assert_eq!(image.uint_at(0x103, 2, Endian::Little), 0x0078);
    }

    #[test]
    fn test_minmax_address() {
        let image = counting_image();
        assert_eq!(image.minmax_address(0, 0x1000), Some((256, 512)));
        assert_eq!(image.minmax_address(300, 10), Some((300, 310)));
        assert_eq!(image.minmax_address(0, 256), None);
        assert_eq!(image.minmax_address(512, 100), None);
    }

    #[test]
    fn test_oversized_block_at_width_zero() {
        let mut image = HexImage::new();
        image.add(0, vec![0xAA; 300]);
        assert!(matches!(
            image.to_hex(0),
            Err(Error::Range { .. })
        ));
    }
}
