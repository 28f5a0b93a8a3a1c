//! Amplifier segments: header-driven layout and placement of one readout.
//!
//! A camera file holds a primary HDU naming the CCD slot followed by one
//! image extension per amplifier. Walking the file reads only headers; the
//! pixel data of each amplifier is located by byte offset and fetched later.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{DAffine2, DVec2};
use log::warn;

use crate::block::{padded_byte_len, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::geometry::{parse_datasec, placement_bounds, Bounds, PixelRect, PlateScale, Region};
use crate::header::Header;
use crate::io::read_exact_at;
use crate::tiled::TileLayout;

/// Identity of a segment: the file, the byte offset of its data, the WCS
/// letter its placement was computed for, and the override replacing the
/// header layout, if any.
///
/// Every cache below the segment lists is keyed by this identity, so two
/// segments with equal ids must have the same datasec and placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId {
    pub file: PathBuf,
    pub offset: u64,
    pub wcs: char,
    pub overridden: Option<OverrideTag>,
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.file.display(), self.offset, self.wcs)?;
        if self.overridden.is_some() {
            f.write_str("+override")?;
        }
        Ok(())
    }
}

/// Key of an override entry: which amplifier of which CCD it replaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideKey {
    pub raft_bay: String,
    pub ccd_slot: String,
    pub channel: i64,
}

/// Replacement datasec and placement parameters for one amplifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmpOverride {
    pub datasec: PixelRect,
    pub plate: PlateScale,
}

/// Bit-exact, orderable form of an [`AmpOverride`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideTag {
    datasec: [usize; 4],
    plate: [u64; 6],
}

impl From<&AmpOverride> for OverrideTag {
    fn from(o: &AmpOverride) -> Self {
        let (d, p) = (o.datasec, o.plate);
        OverrideTag {
            datasec: [d.x, d.y, d.width, d.height],
            plate: [p.pc1_1, p.pc1_2, p.pc2_1, p.pc2_2, p.crval1, p.crval2].map(f64::to_bits),
        }
    }
}

/// An immutable set of per-amplifier placement overrides.
///
/// Sets compare and hash by their entries. The hash is computed once, when
/// the set is built.
#[derive(Debug, Clone)]
pub struct WcsOverrides {
    digest: u64,
    entries: Arc<HashMap<OverrideKey, AmpOverride>>,
}

impl WcsOverrides {
    pub fn new(entries: HashMap<OverrideKey, AmpOverride>) -> Self {
        let mut sorted: Vec<(&OverrideKey, OverrideTag)> =
            entries.iter().map(|(k, v)| (k, OverrideTag::from(v))).collect();
        sorted.sort();
        let mut hasher = DefaultHasher::new();
        sorted.hash(&mut hasher);
        let digest = hasher.finish();
        WcsOverrides {
            digest,
            entries: Arc::new(entries),
        }
    }

    pub fn get(&self, key: &OverrideKey) -> Option<&AmpOverride> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for WcsOverrides {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.entries, &other.entries) {
            return true;
        }
        self.digest == other.digest
            && self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).map(OverrideTag::from) == Some(OverrideTag::from(v)))
    }
}

impl Eq for WcsOverrides {}

impl Hash for WcsOverrides {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

/// Values taken from the primary header and shared by every amplifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcdInfo {
    pub raft_bay: String,
    pub ccd_slot: String,
}

impl CcdInfo {
    pub fn from_primary(header: &Header) -> Result<Self> {
        Ok(CcdInfo {
            ccd_slot: header.string("CCDSLOT")?,
            raft_bay: header.opt_string("RAFTBAY")?.unwrap_or_default(),
        })
    }

    /// Corner-raft wavefront sensors read out half as many amplifiers.
    pub fn amplifier_count(&self) -> usize {
        if self.ccd_slot.starts_with("SW") {
            8
        } else {
            16
        }
    }
}

/// One amplifier's readout region within one file.
#[derive(Debug, Clone)]
pub struct Segment {
    id: SegmentId,
    naxis1: usize,
    naxis2: usize,
    datasec: PixelRect,
    plate: PlateScale,
    placement: DAffine2,
    bounds: Bounds,
    data_len: usize,
    compression: Option<TileLayout>,
    channel: i64,
    name: String,
    ccd: CcdInfo,
}

fn header_usize(header: &Header, keyword: &str) -> Result<usize> {
    let v = header.int(keyword)?;
    usize::try_from(v).map_err(|_| Error::InvalidValue(keyword.to_string()))
}

impl Segment {
    /// Build a segment from one amplifier extension header whose data block
    /// starts at `id.offset`.
    pub fn from_header(
        header: &Header,
        mut id: SegmentId,
        ccd: &CcdInfo,
        overrides: Option<&WcsOverrides>,
    ) -> Result<Segment> {
        let compressed = header.opt_logical("ZIMAGE")?.unwrap_or(false);
        let (naxis1, naxis2, data_len, compression) = if compressed {
            let cmp = header.string("ZCMPTYPE")?;
            if cmp != "GZIP_2" {
                return Err(Error::UnsupportedCompression(cmp));
            }
            let layout = TileLayout {
                row_width: header_usize(header, "NAXIS1")?,
                rows: header_usize(header, "NAXIS2")?,
                heap_len: header_usize(header, "PCOUNT")?,
                tile_width: header_usize(header, "ZTILE1")?,
                tile_height: header_usize(header, "ZTILE2")?,
            };
            (
                header_usize(header, "ZNAXIS1")?,
                header_usize(header, "ZNAXIS2")?,
                layout.data_len(),
                Some(layout),
            )
        } else {
            if let Some(bitpix) = header.opt_int("BITPIX")? {
                if bitpix != 32 {
                    return Err(Error::InvalidValue(format!("BITPIX = {bitpix}")));
                }
            }
            let naxis1 = header_usize(header, "NAXIS1")?;
            let naxis2 = header_usize(header, "NAXIS2")?;
            (naxis1, naxis2, naxis1 * naxis2 * 4, None)
        };

        let channel = header.opt_int("CHANNEL")?.unwrap_or(0);
        let name = header.opt_string("EXTNAME")?.unwrap_or_default();

        let key = OverrideKey {
            raft_bay: ccd.raft_bay.clone(),
            ccd_slot: ccd.ccd_slot.clone(),
            channel,
        };
        let (datasec, plate) = match overrides.and_then(|o| o.get(&key)) {
            Some(o) => {
                id.overridden = Some(OverrideTag::from(o));
                (o.datasec, o.plate)
            }
            None => {
                let l = id.wcs;
                let plate = PlateScale {
                    pc1_1: header.double(&format!("PC1_1{l}"))?,
                    pc2_2: header.double(&format!("PC2_2{l}"))?,
                    pc1_2: header.opt_double(&format!("PC1_2{l}"))?.unwrap_or(0.0),
                    pc2_1: header.opt_double(&format!("PC2_1{l}"))?.unwrap_or(0.0),
                    crval1: header.double(&format!("CRVAL1{l}"))?,
                    crval2: header.double(&format!("CRVAL2{l}"))?,
                };
                (parse_datasec(&header.string("DATASEC")?)?, plate)
            }
        };

        if datasec.right() > naxis1 || datasec.bottom() > naxis2 {
            return Err(Error::InvalidGeometry(format!(
                "datasec {datasec:?} outside {naxis1}x{naxis2} readout"
            )));
        }

        let placement = plate.placement(&datasec)?;
        let bounds = placement_bounds(&placement, &datasec);

        Ok(Segment {
            id,
            naxis1,
            naxis2,
            datasec,
            plate,
            placement,
            bounds,
            data_len,
            compression,
            channel,
            name,
            ccd: ccd.clone(),
        })
    }

    pub fn id(&self) -> &SegmentId {
        &self.id
    }

    pub fn file(&self) -> &Path {
        &self.id.file
    }

    pub fn naxis1(&self) -> usize {
        self.naxis1
    }

    pub fn naxis2(&self) -> usize {
        self.naxis2
    }

    pub fn datasec(&self) -> &PixelRect {
        &self.datasec
    }

    pub fn plate(&self) -> &PlateScale {
        &self.plate
    }

    /// Bytes of (possibly compressed) data stored in the file.
    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub fn compression(&self) -> Option<&TileLayout> {
        self.compression.as_ref()
    }

    pub fn channel(&self) -> i64 {
        self.channel
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raft_bay(&self) -> &str {
        &self.ccd.raft_bay
    }

    pub fn ccd_slot(&self) -> &str {
        &self.ccd.ccd_slot
    }

    /// Mosaic-space hull of the datasec.
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn intersects(&self, region: &Region) -> bool {
        self.bounds.intersects(region)
    }

    /// Transform from tile pixels to mosaic coordinates.
    ///
    /// Without overscan the source is the datasec sub-image, whose origin is
    /// the datasec corner. With overscan the source is the whole readout, so
    /// the transform is shifted back by the datasec origin.
    pub fn placement(&self, include_overscan: bool) -> DAffine2 {
        if include_overscan {
            let origin = DVec2::new(self.datasec.x as f64, self.datasec.y as f64);
            self.placement * DAffine2::from_translation(-origin)
        } else {
            self.placement
        }
    }

    /// Readout pixel (column, row) under a mosaic point, if it falls inside
    /// the datasec.
    pub fn world_to_pixel(&self, point: DVec2) -> Option<(usize, usize)> {
        let local = self.placement.inverse().transform_point2(point).floor();
        let (w, h) = (self.datasec.width as f64, self.datasec.height as f64);
        if local.x < 0.0 || local.y < 0.0 || local.x >= w || local.y >= h {
            return None;
        }
        Some((self.datasec.x + local.x as usize, self.datasec.y + local.y as usize))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}/{}",
            self.id.file.display(),
            self.name,
            self.ccd.raft_bay,
            self.ccd.ccd_slot
        )
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Segment {}

/// Read one header starting at `offset`, returning it and the offset of the
/// data that follows.
fn read_header_at(file: &File, offset: u64) -> Result<(Header, u64)> {
    let mut header = Header::new();
    let mut block = [0u8; BLOCK_SIZE];
    let mut pos = offset;
    loop {
        read_exact_at(file, &mut block, pos)?;
        pos += BLOCK_SIZE as u64;
        if header.push_block(&block)? {
            return Ok((header, pos));
        }
    }
}

/// Byte length of the data of a header-only or plain image HDU.
fn primary_data_len(header: &Header) -> Result<u64> {
    let naxis = header.opt_int("NAXIS")?.unwrap_or(0);
    if naxis == 0 {
        return Ok(0);
    }
    let bitpix = header.int("BITPIX")?;
    let mut len = bitpix.unsigned_abs() / 8;
    for i in 1..=naxis {
        len *= header.int(&format!("NAXIS{i}"))?.unsigned_abs();
    }
    Ok(len)
}

/// Walk the headers of `path` and build its amplifier segments.
///
/// A file that ends cleanly at an HDU boundary before the expected number
/// of amplifiers yields the segments read so far.
pub fn read_segments(
    file: &File,
    path: &Path,
    wcs: char,
    overrides: Option<&WcsOverrides>,
) -> Result<Vec<Arc<Segment>>> {
    let file_len = file.metadata()?.len();
    let (primary, data_start) = read_header_at(file, 0)?;
    let ccd = CcdInfo::from_primary(&primary)?;
    let expected = ccd.amplifier_count();
    let mut offset = data_start + padded_byte_len(primary_data_len(&primary)?);

    let mut segments = Vec::with_capacity(expected);
    while segments.len() < expected {
        if offset >= file_len {
            warn!(
                "{} ends after {} of {} amplifiers",
                path.display(),
                segments.len(),
                expected
            );
            break;
        }
        let (header, data_offset) = read_header_at(file, offset)?;
        let id = SegmentId {
            file: path.to_path_buf(),
            offset: data_offset,
            wcs,
            overridden: None,
        };
        let segment = Segment::from_header(&header, id, &ccd, overrides)?;
        offset = data_offset + padded_byte_len(segment.data_len as u64);
        segments.push(Arc::new(segment));
    }
    Ok(segments)
}

/// Segment with an identity placement at the mosaic origin, for unit tests.
#[cfg(test)]
pub(crate) fn test_segment(naxis1: usize, naxis2: usize, datasec: &str) -> Segment {
    test_segment_at(0, naxis1, naxis2, datasec)
}

/// As [`test_segment`], with its data at byte `offset` of the file.
#[cfg(test)]
pub(crate) fn test_segment_at(offset: u64, naxis1: usize, naxis2: usize, datasec: &str) -> Segment {
    use crate::header::{serialize_header, Card};
    use crate::value::Value;

    let cards = [
        Card::new("NAXIS1", Value::Integer(naxis1 as i64)),
        Card::new("NAXIS2", Value::Integer(naxis2 as i64)),
        Card::new("DATASEC", Value::String(datasec.into())),
        Card::new("PC1_1Q", Value::Float(1.0)),
        Card::new("PC2_2Q", Value::Float(1.0)),
        Card::new("CRVAL1Q", Value::Float(0.0)),
        Card::new("CRVAL2Q", Value::Float(0.0)),
    ];
    let header = Header::parse(&serialize_header(&cards)).unwrap();
    let id = SegmentId {
        file: PathBuf::from("test.fits"),
        offset,
        wcs: 'Q',
        overridden: None,
    };
    let ccd = CcdInfo {
        raft_bay: "R22".into(),
        ccd_slot: "S11".into(),
    };
    Segment::from_header(&header, id, &ccd, None).unwrap()
}
