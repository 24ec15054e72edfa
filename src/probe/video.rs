//! Minimal video container readers: just enough to find the frame size.
//!
//! Two container families cover what ends up on a web page:
//!
//! - **ISO-BMFF** (`.mp4`, `.m4v`, `.mov`): the first `moov/trak/tkhd` box
//!   with a non-zero size. A 90° or 270° rotation matrix swaps the axes.
//! - **Matroska / WebM**: `Segment/Tracks/TrackEntry/Video`, preferring
//!   `DisplayWidth`/`DisplayHeight` over `PixelWidth`/`PixelHeight`.
//!
//! The container is recognised from its magic bytes, not the extension.
//! Everything not on the path to the size (`mdat`, `Cluster`, ...) is
//! skipped with a seek, so multi-gigabyte files cost a handful of reads.

use super::backend::ProbeError;
use crate::types::Dimensions;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Upper bound for a `moov` box read into memory.
const MAX_MOOV_SIZE: u64 = 64 * 1024 * 1024;

/// Upper bound for the Matroska `Tracks` element read into memory.
const MAX_TRACKS_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    IsoBmff,
    Matroska,
}

/// Read the display size of the video stream in `path`.
pub fn read_video_dimensions(path: &Path) -> Result<Dimensions, ProbeError> {
    let file = File::open(path).map_err(|e| ProbeError::from_io(path, e))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 12];
    let n = read_up_to(&mut reader, &mut magic).map_err(|e| ProbeError::from_io(path, e))?;
    let Some(container) = sniff(&magic[..n]) else {
        return Err(ProbeError::UnsupportedFormat(path.to_path_buf()));
    };
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| ProbeError::from_io(path, e))?;

    let found = match container {
        Container::IsoBmff => iso_bmff_dimensions(&mut reader),
        Container::Matroska => matroska_dimensions(&mut reader),
    }
    .map_err(|e| ProbeError::from_io(path, e))?;

    found.ok_or_else(|| ProbeError::corrupt(path, "no video track with a frame size"))
}

/// Fill as much of `buf` as the reader has; short files are not an error here.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn sniff(magic: &[u8]) -> Option<Container> {
    const EBML_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
    const BOX_TYPES: &[&[u8; 4]] = &[b"ftyp", b"moov", b"mdat", b"free", b"wide", b"skip"];

    if magic.starts_with(EBML_MAGIC) {
        return Some(Container::Matroska);
    }
    if magic.len() >= 8 && BOX_TYPES.iter().any(|t| &magic[4..8] == *t) {
        return Some(Container::IsoBmff);
    }
    None
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

// ---------------------------------------------------------------------------
// ISO-BMFF (MP4 / QuickTime)
// ---------------------------------------------------------------------------

/// A box header: type and payload size (header excluded).
///
/// `payload` is `None` for a size-0 box, which extends to end of file.
struct BoxHeader {
    kind: [u8; 4],
    payload: Option<u64>,
}

/// Read a box header from a stream. `Ok(None)` at a clean end of file.
fn read_box_header(reader: &mut impl Read) -> io::Result<Option<BoxHeader>> {
    let mut head = [0u8; 8];
    if read_up_to(reader, &mut head)? < 8 {
        return Ok(None);
    }
    let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as u64;
    let kind = [head[4], head[5], head[6], head[7]];
    let payload = match size {
        0 => None,
        1 => {
            let mut large = [0u8; 8];
            reader.read_exact(&mut large)?;
            let size = u64::from_be_bytes(large);
            Some(size.checked_sub(16).ok_or_else(|| invalid("box smaller than header"))?)
        }
        _ => Some(size.checked_sub(8).ok_or_else(|| invalid("box smaller than header"))?),
    };
    Ok(Some(BoxHeader { kind, payload }))
}

/// Walk top-level boxes until `moov`, then read it and find the track size.
///
/// `moov` may come after `mdat` (files not prepared for streaming), so the
/// walk seeks past every other box.
fn iso_bmff_dimensions<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Dimensions>> {
    while let Some(header) = read_box_header(reader)? {
        if &header.kind == b"moov" {
            let size = match header.payload {
                Some(size) => size,
                None => {
                    let here = reader.stream_position()?;
                    let end = reader.seek(SeekFrom::End(0))?;
                    reader.seek(SeekFrom::Start(here))?;
                    end - here
                }
            };
            if size > MAX_MOOV_SIZE {
                return Err(invalid("moov box too large"));
            }
            let mut moov = vec![0u8; size as usize];
            reader.read_exact(&mut moov)?;
            return Ok(moov_dimensions(&moov));
        }
        match header.payload {
            Some(size) => {
                let skip = i64::try_from(size).map_err(|_| invalid("box size overflow"))?;
                reader.seek(SeekFrom::Current(skip))?;
            }
            None => break,
        }
    }
    Ok(None)
}

/// Iterate the child boxes of an in-memory box payload as `(type, payload)`.
fn child_boxes(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        if pos + 8 > data.len() {
            return None;
        }
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let kind = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
        let (header_len, total) = match size {
            0 => (8, data.len() - pos),
            1 => {
                if pos + 16 > data.len() {
                    return None;
                }
                let mut large = [0u8; 8];
                large.copy_from_slice(&data[pos + 8..pos + 16]);
                (16, usize::try_from(u64::from_be_bytes(large)).ok()?)
            }
            n => (8, n),
        };
        let end = pos.checked_add(total)?;
        if total < header_len || end > data.len() {
            return None;
        }
        let payload = &data[pos + header_len..end];
        pos = end;
        Some((kind, payload))
    })
}

fn moov_dimensions(moov: &[u8]) -> Option<Dimensions> {
    child_boxes(moov)
        .filter(|(kind, _)| kind == b"trak")
        .filter_map(|(_, trak)| child_boxes(trak).find(|(kind, _)| kind == b"tkhd"))
        .find_map(|(_, tkhd)| parse_tkhd(tkhd))
}

/// Parse a track header box payload.
///
/// Layout after the 4-byte version/flags:
///   v0: creation(4) modification(4) track_id(4) reserved(4) duration(4)
///   v1: creation(8) modification(8) track_id(4) reserved(4) duration(8)
/// then reserved(8) layer(2) alternate_group(2) volume(2) reserved(2),
/// a 3x3 matrix of 32-bit values, and width/height as 16.16 fixed point.
/// Audio tracks carry a zero size and are skipped.
fn parse_tkhd(data: &[u8]) -> Option<Dimensions> {
    let version = *data.first()?;
    let matrix_at = match version {
        0 => 4 + 20 + 16,
        1 => 4 + 32 + 16,
        _ => return None,
    };
    let size_at = matrix_at + 36;
    if data.len() < size_at + 8 {
        return None;
    }

    let read_u32 = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    let width = read_u32(size_at) >> 16;
    let height = read_u32(size_at + 4) >> 16;
    if width == 0 || height == 0 {
        return None;
    }

    // Matrix entries a, b (row 0) in 16.16: a == 0 with b == ±1 is a quarter turn.
    let a = read_u32(matrix_at) as i32;
    let b = read_u32(matrix_at + 4) as i32;
    let dims = Dimensions::new(width, height);
    if a == 0 && b.unsigned_abs() == 0x0001_0000 {
        Some(dims.transposed())
    } else {
        Some(dims)
    }
}

// ---------------------------------------------------------------------------
// Matroska / WebM (EBML)
// ---------------------------------------------------------------------------

const ID_EBML: u32 = 0x1A45_DFA3;
const ID_SEGMENT: u32 = 0x1853_8067;
const ID_TRACKS: u32 = 0x1654_AE6B;
const ID_CLUSTER: u32 = 0x1F43_B675;
const ID_TRACK_ENTRY: u32 = 0xAE;
const ID_VIDEO: u32 = 0xE0;
const ID_PIXEL_WIDTH: u32 = 0xB0;
const ID_PIXEL_HEIGHT: u32 = 0xBA;
const ID_DISPLAY_WIDTH: u32 = 0x54B0;
const ID_DISPLAY_HEIGHT: u32 = 0x54BA;

/// Read an element ID. The marker bits are kept, as IDs are written that way.
fn read_element_id(reader: &mut impl Read) -> io::Result<Option<u32>> {
    let mut first = [0u8; 1];
    if read_up_to(reader, &mut first)? == 0 {
        return Ok(None);
    }
    let len = first[0].leading_zeros() as usize + 1;
    if len > 4 {
        return Err(invalid("element id longer than 4 bytes"));
    }
    let mut id = first[0] as u32;
    for _ in 1..len {
        let mut b = [0u8; 1];
        reader.read_exact(&mut b)?;
        id = (id << 8) | b[0] as u32;
    }
    Ok(Some(id))
}

/// Read an element data size. `None` is the reserved "unknown size".
fn read_element_size(reader: &mut impl Read) -> io::Result<Option<u64>> {
    let mut first = [0u8; 1];
    reader.read_exact(&mut first)?;
    let len = first[0].leading_zeros() as usize + 1;
    if len > 8 {
        return Err(invalid("element size longer than 8 bytes"));
    }
    let mut value = (first[0] as u64) & (0xFF >> len);
    let mut all_ones = value == (0xFF >> len) as u64;
    for _ in 1..len {
        let mut b = [0u8; 1];
        reader.read_exact(&mut b)?;
        value = (value << 8) | b[0] as u64;
        all_ones &= b[0] == 0xFF;
    }
    Ok(if all_ones { None } else { Some(value) })
}

/// Same as the stream readers above, over a slice: `(id, payload, rest)`.
fn next_element(data: &[u8]) -> Option<(u32, &[u8], &[u8])> {
    let mut cursor = io::Cursor::new(data);
    let id = read_element_id(&mut cursor).ok()??;
    let size = read_element_size(&mut cursor).ok()?;
    let start = cursor.position() as usize;
    let end = match size {
        Some(size) => start.checked_add(usize::try_from(size).ok()?)?,
        None => data.len(),
    };
    if end > data.len() {
        return None;
    }
    Some((id, &data[start..end], &data[end..]))
}

fn child_elements(mut data: &[u8]) -> impl Iterator<Item = (u32, &[u8])> {
    std::iter::from_fn(move || {
        let (id, payload, rest) = next_element(data)?;
        data = rest;
        Some((id, payload))
    })
}

fn read_uint(payload: &[u8]) -> Option<u32> {
    if payload.is_empty() || payload.len() > 8 {
        return None;
    }
    let value = payload.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    u32::try_from(value).ok()
}

/// Find `Tracks` inside the segment, then the first sized video track.
fn matroska_dimensions<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Dimensions>> {
    // EBML header, then Segment.
    match read_element_id(reader)? {
        Some(ID_EBML) => {}
        _ => return Err(invalid("missing EBML header")),
    }
    let header_size = read_element_size(reader)?.ok_or_else(|| invalid("unsized EBML header"))?;
    reader.seek(SeekFrom::Current(
        i64::try_from(header_size).map_err(|_| invalid("EBML header too large"))?,
    ))?;
    match read_element_id(reader)? {
        Some(ID_SEGMENT) => {}
        _ => return Err(invalid("missing Segment")),
    }
    let _segment_size = read_element_size(reader)?;

    // Segment children: skip until Tracks. Clusters of an unknown-size live
    // stream cannot be skipped, and Tracks always precede them anyway.
    while let Some(id) = read_element_id(reader)? {
        let size = read_element_size(reader)?;
        match (id, size) {
            (ID_TRACKS, Some(size)) => {
                if size > MAX_TRACKS_SIZE {
                    return Err(invalid("Tracks element too large"));
                }
                let mut tracks = vec![0u8; size as usize];
                reader.read_exact(&mut tracks)?;
                return Ok(tracks_dimensions(&tracks));
            }
            (ID_CLUSTER, _) | (_, None) => break,
            (_, Some(size)) => {
                let skip = i64::try_from(size).map_err(|_| invalid("element size overflow"))?;
                reader.seek(SeekFrom::Current(skip))?;
            }
        }
    }
    Ok(None)
}

fn tracks_dimensions(tracks: &[u8]) -> Option<Dimensions> {
    child_elements(tracks)
        .filter(|(id, _)| *id == ID_TRACK_ENTRY)
        .filter_map(|(_, entry)| child_elements(entry).find(|(id, _)| *id == ID_VIDEO))
        .find_map(|(_, video)| video_element_dimensions(video))
}

fn video_element_dimensions(video: &[u8]) -> Option<Dimensions> {
    let (mut pixel_w, mut pixel_h, mut display_w, mut display_h) = (None, None, None, None);
    for (id, payload) in child_elements(video) {
        match id {
            ID_PIXEL_WIDTH => pixel_w = read_uint(payload),
            ID_PIXEL_HEIGHT => pixel_h = read_uint(payload),
            ID_DISPLAY_WIDTH => display_w = read_uint(payload),
            ID_DISPLAY_HEIGHT => display_h = read_uint(payload),
            _ => {}
        }
    }
    let (width, height) = match (display_w, display_h) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => (pixel_w?, pixel_h?),
    };
    (width > 0 && height > 0).then(|| Dimensions::new(width, height))
}
