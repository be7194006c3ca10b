/// Per-image pixel format normalization
///
/// Every output image ends up as 8-bit RGB or 8-bit RGBA:
/// - canonical sources are copied byte-for-byte
/// - palette and grayscale sources are expanded, keeping alpha only when the
///   source has an alpha channel or a transparency key
/// - anything else is flattened onto a white canvas

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{imageops, DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, warn};

use super::encoding::{self, CanonicalEncoding, PixelEncoding};
use crate::error::ConvertError;

/// What happened to one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Already canonical; copied unchanged
    Copied(PixelEncoding),
    /// Rewritten into a canonical encoding
    Converted {
        from: PixelEncoding,
        to: CanonicalEncoding,
    },
}

impl Conversion {
    pub fn was_transformed(&self) -> bool {
        matches!(self, Conversion::Converted { .. })
    }

    pub fn original(&self) -> PixelEncoding {
        match self {
            Conversion::Copied(encoding) => *encoding,
            Conversion::Converted { from, .. } => *from,
        }
    }

    pub fn result(&self) -> CanonicalEncoding {
        match self {
            // canonical() is always Some for a copied image
            Conversion::Copied(encoding) => encoding.canonical().unwrap_or(CanonicalEncoding::Rgb8),
            Conversion::Converted { to, .. } => *to,
        }
    }
}

/// Action chosen for a source encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Copy,
    Expand(CanonicalEncoding),
    FlattenOnWhite,
}

/// Decide how an encoding is brought into canonical form
pub fn plan(encoding: &PixelEncoding) -> Plan {
    if encoding.canonical().is_some() {
        return Plan::Copy;
    }

    if encoding.is_palette_or_gray() {
        if encoding.transparency_key || encoding.has_alpha() {
            Plan::Expand(CanonicalEncoding::Rgba8)
        } else {
            Plan::Expand(CanonicalEncoding::Rgb8)
        }
    } else {
        Plan::FlattenOnWhite
    }
}

/// Normalize `src` into `dest`, creating `dest`'s parent directory.
///
/// The source file is only ever read.
pub fn normalize_image(src: &Path, dest: &Path, optimize: bool) -> Result<Conversion, ConvertError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| ConvertError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let record = encoding::inspect(src)?;
    let original = record.encoding;
    debug!(
        "{}: {}x{} {}",
        record.path.display(),
        record.width,
        record.height,
        original
    );

    let target = match plan(&original) {
        Plan::Copy => {
            fs::copy(src, dest).map_err(|source| ConvertError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
            return Ok(Conversion::Copied(original));
        }
        Plan::Expand(target) => {
            let img = open(src)?;
            let expanded = match target {
                CanonicalEncoding::Rgb8 => DynamicImage::ImageRgb8(img.to_rgb8()),
                CanonicalEncoding::Rgba8 => DynamicImage::ImageRgba8(img.to_rgba8()),
            };
            save_png(&expanded, dest, optimize)?;
            target
        }
        Plan::FlattenOnWhite => {
            let img = open(src)?;
            let flattened = flatten_on_white(&img, original.has_alpha());
            save_png(&DynamicImage::ImageRgb8(flattened), dest, optimize)?;
            CanonicalEncoding::Rgb8
        }
    };

    Ok(Conversion::Converted {
        from: original,
        to: target,
    })
}

/// Draw `img` on an opaque white canvas of the same size.
///
/// With `use_alpha` the alpha channel is the blend mask; otherwise the
/// pixels replace the canvas outright.
pub fn flatten_on_white(img: &DynamicImage, use_alpha: bool) -> RgbImage {
    let (width, height) = (img.width(), img.height());

    if use_alpha {
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
        DynamicImage::ImageRgba8(canvas).to_rgb8()
    } else {
        let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        imageops::replace(&mut canvas, &img.to_rgb8(), 0, 0);
        canvas
    }
}

fn open(path: &Path) -> Result<DynamicImage, ConvertError> {
    image::open(path).map_err(|source| ConvertError::Codec {
        path: path.to_path_buf(),
        source,
    })
}

fn save_png(img: &DynamicImage, dest: &Path, optimize: bool) -> Result<(), ConvertError> {
    let file = File::create(dest).map_err(|source| ConvertError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    let compression = if optimize {
        CompressionType::Best
    } else {
        CompressionType::Default
    };
    let encoder = PngEncoder::new_with_quality(BufWriter::new(file), compression, FilterType::Adaptive);

    img.write_with_encoder(encoder).map_err(|source| {
        // Never leave a partial PNG in the mirrored tree
        if let Err(e) = fs::remove_file(dest) {
            warn!("Could not remove partial output {}: {}", dest.display(), e);
        }
        ConvertError::Codec {
            path: dest.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::encoding::ColorModel;
    use image::{GrayImage, ImageBuffer, Luma, LumaA};
    use std::path::PathBuf;

    fn write_palette_png(path: &Path, with_trns: bool) {
        let file = File::create(path).unwrap();
        let mut encoder = png::Encoder::new(BufWriter::new(file), 2, 1);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        // index 0 = red, index 1 = blue
        encoder.set_palette(vec![255, 0, 0, 0, 0, 255]);
        if with_trns {
            encoder.set_trns(vec![0, 255]);
        }
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0, 1]).unwrap();
    }

    fn write_gray_trns_png(path: &Path) {
        let file = File::create(path).unwrap();
        let mut encoder = png::Encoder::new(BufWriter::new(file), 2, 1);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_trns(vec![0, 0]);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0, 200]).unwrap();
    }

    fn paths(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
        (dir.join("in").join(name), dir.join("out").join(name))
    }

    fn setup(dir: &Path) {
        fs::create_dir_all(dir.join("in")).unwrap();
    }

    #[test]
    fn test_plan_policy() {
        let p = |model, depth, trns| plan(&PixelEncoding::new(model, depth, trns));

        assert_eq!(p(ColorModel::Rgb, 8, false), Plan::Copy);
        assert_eq!(p(ColorModel::Rgba, 8, false), Plan::Copy);
        assert_eq!(p(ColorModel::Palette, 8, true), Plan::Expand(CanonicalEncoding::Rgba8));
        assert_eq!(p(ColorModel::Palette, 4, false), Plan::Expand(CanonicalEncoding::Rgb8));
        assert_eq!(p(ColorModel::Gray, 8, false), Plan::Expand(CanonicalEncoding::Rgb8));
        assert_eq!(p(ColorModel::Gray, 16, true), Plan::Expand(CanonicalEncoding::Rgba8));
        assert_eq!(p(ColorModel::GrayAlpha, 8, false), Plan::Expand(CanonicalEncoding::Rgba8));
        assert_eq!(p(ColorModel::Rgb, 16, false), Plan::FlattenOnWhite);
        assert_eq!(p(ColorModel::Rgba, 16, false), Plan::FlattenOnWhite);
    }

    #[test]
    fn test_canonical_is_copied_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let (src, dest) = paths(dir.path(), "rgb.png");
        RgbImage::from_fn(4, 4, |x, y| Rgb([x as u8 * 40, y as u8 * 40, 7]))
            .save(&src)
            .unwrap();

        let conversion = normalize_image(&src, &dest, true).unwrap();

        assert!(!conversion.was_transformed());
        assert_eq!(conversion.result(), CanonicalEncoding::Rgb8);
        assert_eq!(fs::read(&src).unwrap(), fs::read(&dest).unwrap());
    }

    #[test]
    fn test_rgba_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let (src, dest) = paths(dir.path(), "rgba.png");
        RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])).save(&src).unwrap();

        let conversion = normalize_image(&src, &dest, false).unwrap();

        assert_eq!(conversion, Conversion::Copied(PixelEncoding::new(ColorModel::Rgba, 8, false)));
        assert_eq!(fs::read(&src).unwrap(), fs::read(&dest).unwrap());
    }

    #[test]
    fn test_palette_with_transparency_becomes_rgba() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let (src, dest) = paths(dir.path(), "palette.png");
        write_palette_png(&src, true);
        let before = fs::read(&src).unwrap();

        let conversion = normalize_image(&src, &dest, true).unwrap();

        assert!(conversion.was_transformed());
        assert_eq!(conversion.result(), CanonicalEncoding::Rgba8);
        assert_eq!(conversion.original().model, ColorModel::Palette);

        let out = encoding::inspect(&dest).unwrap();
        assert_eq!(out.encoding.canonical(), Some(CanonicalEncoding::Rgba8));
        assert_ne!(out.encoding, conversion.original());

        let pixels = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(pixels.get_pixel(0, 0)[3], 0);
        assert_eq!(*pixels.get_pixel(1, 0), Rgba([0, 0, 255, 255]));

        // source untouched
        assert_eq!(fs::read(&src).unwrap(), before);
    }

    #[test]
    fn test_palette_without_transparency_becomes_rgb() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let (src, dest) = paths(dir.path(), "palette.png");
        write_palette_png(&src, false);

        let conversion = normalize_image(&src, &dest, true).unwrap();

        assert_eq!(conversion.result(), CanonicalEncoding::Rgb8);
        let pixels = image::open(&dest).unwrap().to_rgb8();
        assert_eq!(*pixels.get_pixel(0, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_gray_without_alpha_becomes_rgb() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let (src, dest) = paths(dir.path(), "gray.png");
        GrayImage::from_pixel(3, 3, Luma([90])).save(&src).unwrap();

        let conversion = normalize_image(&src, &dest, true).unwrap();

        assert!(conversion.was_transformed());
        assert_eq!(conversion.result(), CanonicalEncoding::Rgb8);
        let out = encoding::inspect(&dest).unwrap();
        assert_eq!(out.encoding, PixelEncoding::new(ColorModel::Rgb, 8, false));
        assert_eq!(*image::open(&dest).unwrap().to_rgb8().get_pixel(1, 1), Rgb([90, 90, 90]));
    }

    #[test]
    fn test_gray_alpha_and_gray_key_become_rgba() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());

        let (src, dest) = paths(dir.path(), "gray_alpha.png");
        ImageBuffer::<LumaA<u8>, _>::from_pixel(2, 2, LumaA([50, 128]))
            .save(&src)
            .unwrap();
        let conversion = normalize_image(&src, &dest, true).unwrap();
        assert_eq!(conversion.result(), CanonicalEncoding::Rgba8);
        assert_eq!(*image::open(&dest).unwrap().to_rgba8().get_pixel(0, 0), Rgba([50, 50, 50, 128]));

        let (src, dest) = paths(dir.path(), "gray_key.png");
        write_gray_trns_png(&src);
        let conversion = normalize_image(&src, &dest, true).unwrap();
        assert_eq!(conversion.result(), CanonicalEncoding::Rgba8);
        let pixels = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(pixels.get_pixel(0, 0)[3], 0);
        assert_eq!(*pixels.get_pixel(1, 0), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_deep_rgba_is_flattened_on_white() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let (src, dest) = paths(dir.path(), "deep.png");
        let img: ImageBuffer<Rgba<u16>, Vec<u16>> = ImageBuffer::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([65535, 0, 0, 65535])
            }
        });
        img.save(&src).unwrap();

        let conversion = normalize_image(&src, &dest, true).unwrap();

        assert_eq!(conversion.original(), PixelEncoding::new(ColorModel::Rgba, 16, false));
        assert_eq!(conversion.result(), CanonicalEncoding::Rgb8);
        let pixels = image::open(&dest).unwrap().to_rgb8();
        assert_eq!(*pixels.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*pixels.get_pixel(1, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_deep_rgb_is_pasted_directly() {
        let img = DynamicImage::ImageRgb16(ImageBuffer::from_pixel(1, 1, Rgb([0u16, 65535, 0])));
        let flat = flatten_on_white(&img, false);
        assert_eq!(*flat.get_pixel(0, 0), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let (src, dest) = paths(dir.path(), "corrupt.png");
        fs::write(&src, b"\x89PNG but not really").unwrap();

        let err = normalize_image(&src, &dest, true).unwrap_err();
        assert_eq!(err.path(), &src);
        assert!(!dest.exists());
    }

    #[test]
    fn test_failed_encode_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("empty.png");

        // Zero-sized images are rejected by the PNG encoder after the file is created
        let err = save_png(&DynamicImage::new_rgb8(0, 0), &dest, false).unwrap_err();

        assert!(matches!(err, ConvertError::Codec { .. }));
        assert_eq!(err.path(), &dest);
        assert!(!dest.exists());
    }
}
