use std::path::{Path, PathBuf};

use crate::bias::BiasCorrection;
use crate::colormap::ColorMap;
use crate::geometry::Region;
use crate::segment::WcsOverrides;

/// How pixel values are scaled to color indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScaleMode {
    /// Each amplifier is equalized by its own histogram.
    #[default]
    PerAmplifier,
    /// Every amplifier of the mosaic shares one merged histogram.
    Global,
}

/// Parameters of one region render.
///
/// ```no_run
/// use camera_fits::{BiasCorrection, Region, RenderRequest, ScaleMode};
///
/// let request = RenderRequest::new("focal-plane.txt")
///     .region(Region::new(0, 0, 4096, 4096))
///     .bias(BiasCorrection::serial_parallel())
///     .scale(ScaleMode::Global);
/// ```
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub descriptor: PathBuf,
    /// Area of the mosaic to render; `None` covers every segment.
    pub region: Option<Region>,
    pub bias: BiasCorrection,
    /// Display palette. Tiles are rendered with the engine's own map and
    /// remapped channel by channel when this one differs.
    pub color_map: Option<ColorMap>,
    pub scale: ScaleMode,
    /// WCS letter selecting the placement keywords, `Q` by default.
    pub wcs: char,
    pub overrides: Option<WcsOverrides>,
    /// Draw whole readouts, overscan included, instead of the datasec only.
    pub include_overscan: bool,
}

impl RenderRequest {
    pub fn new(descriptor: impl AsRef<Path>) -> Self {
        RenderRequest {
            descriptor: descriptor.as_ref().to_path_buf(),
            region: None,
            bias: BiasCorrection::None,
            color_map: None,
            scale: ScaleMode::PerAmplifier,
            wcs: 'Q',
            overrides: None,
            include_overscan: false,
        }
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn bias(mut self, bias: BiasCorrection) -> Self {
        self.bias = bias;
        self
    }

    pub fn color_map(mut self, color_map: ColorMap) -> Self {
        self.color_map = Some(color_map);
        self
    }

    pub fn scale(mut self, scale: ScaleMode) -> Self {
        self.scale = scale;
        self
    }

    pub fn wcs(mut self, wcs: char) -> Self {
        self.wcs = wcs;
        self
    }

    pub fn overrides(mut self, overrides: WcsOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn include_overscan(mut self, include: bool) -> Self {
        self.include_overscan = include;
        self
    }
}
