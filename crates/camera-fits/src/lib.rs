//! Cached, asynchronous rendering of camera mosaics stored as
//! multi-amplifier FITS files.
//!
//! A mosaic is described by a text file listing camera files. Each file
//! holds one image extension per amplifier readout; [`CacheEngine`] decodes
//! them (optionally `GZIP_2` tile compressed), corrects their bias from the
//! overscan, equalizes their contrast and draws them into a [`Canvas`]
//! through each amplifier's world-coordinate placement.

pub mod bias;
pub mod block;
pub mod cache;
pub mod colormap;
pub mod compositor;
pub mod config;
pub mod descriptor;
pub mod endian;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod header;
pub mod histogram;
pub mod io;
pub mod raw;
pub mod reader;
pub mod request;
pub mod segment;
pub mod tile;
pub mod tiled;
pub mod value;

pub use bias::BiasCorrection;
pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use colormap::{ColorMap, Rgb};
pub use compositor::Canvas;
pub use config::EngineConfig;
pub use engine::{CacheEngine, EngineStats};
pub use error::{Error, ErrorKind, Result};
pub use geometry::Region;
pub use histogram::Histogram;
pub use raw::RawData;
pub use reader::CameraReader;
pub use request::{RenderRequest, ScaleMode};
pub use segment::{Segment, SegmentId, WcsOverrides};
pub use tile::RenderedTile;
