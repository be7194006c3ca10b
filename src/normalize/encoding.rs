/// Pixel encoding inspection
///
/// The PNG header is read directly rather than through a full decode:
/// the decoder expands palettes and transparency keys, which would hide
/// exactly the information the conversion policy depends on.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::ConvertError;

/// Channel layout declared in the PNG header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    Gray,
    GrayAlpha,
    Palette,
    Rgb,
    Rgba,
}

/// Pixel encoding of a source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelEncoding {
    pub model: ColorModel,
    /// Bits per sample (palette: bits per index)
    pub bit_depth: u8,
    /// A tRNS chunk is present
    pub transparency_key: bool,
}

/// The two encodings every output image conforms to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalEncoding {
    /// 8-bit opaque color
    Rgb8,
    /// 8-bit color with alpha
    Rgba8,
}

impl PixelEncoding {
    pub fn new(model: ColorModel, bit_depth: u8, transparency_key: bool) -> Self {
        Self {
            model,
            bit_depth,
            transparency_key,
        }
    }

    /// The canonical encoding this already is, if any
    pub fn canonical(&self) -> Option<CanonicalEncoding> {
        match (self.model, self.bit_depth) {
            (ColorModel::Rgb, 8) => Some(CanonicalEncoding::Rgb8),
            (ColorModel::Rgba, 8) => Some(CanonicalEncoding::Rgba8),
            _ => None,
        }
    }

    /// Carries an alpha channel (a transparency key is not a channel)
    pub fn has_alpha(&self) -> bool {
        matches!(self.model, ColorModel::GrayAlpha | ColorModel::Rgba)
    }

    /// Palette or grayscale, with or without alpha
    pub fn is_palette_or_gray(&self) -> bool {
        matches!(
            self.model,
            ColorModel::Palette | ColorModel::Gray | ColorModel::GrayAlpha
        )
    }
}

impl From<png::ColorType> for ColorModel {
    fn from(color: png::ColorType) -> Self {
        match color {
            png::ColorType::Grayscale => ColorModel::Gray,
            png::ColorType::GrayscaleAlpha => ColorModel::GrayAlpha,
            png::ColorType::Indexed => ColorModel::Palette,
            png::ColorType::Rgb => ColorModel::Rgb,
            png::ColorType::Rgba => ColorModel::Rgba,
        }
    }
}

impl fmt::Display for ColorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorModel::Gray => "gray",
            ColorModel::GrayAlpha => "gray+alpha",
            ColorModel::Palette => "palette",
            ColorModel::Rgb => "RGB",
            ColorModel::Rgba => "RGBA",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}bit", self.model, self.bit_depth)?;
        if self.transparency_key {
            f.write_str("+tRNS")?;
        }
        Ok(())
    }
}

impl fmt::Display for CanonicalEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalEncoding::Rgb8 => f.write_str("RGB/8bit"),
            CanonicalEncoding::Rgba8 => f.write_str("RGBA/8bit"),
        }
    }
}

/// One image found during traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub encoding: PixelEncoding,
    pub width: u32,
    pub height: u32,
}

/// Read the PNG header of `path`
pub fn inspect(path: &Path) -> Result<ImageRecord, ConvertError> {
    let file = File::open(path).map_err(|source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let decoder = png::Decoder::new(BufReader::new(file));
    let reader = decoder.read_info().map_err(|source| ConvertError::Header {
        path: path.to_path_buf(),
        source,
    })?;
    let info = reader.info();

    Ok(ImageRecord {
        path: path.to_path_buf(),
        encoding: PixelEncoding::new(
            info.color_type.into(),
            info.bit_depth as u8,
            info.trns.is_some(),
        ),
        width: info.width,
        height: info.height,
    })
}
