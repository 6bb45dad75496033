//! Decode, orient, cover-crop and encode square JPEG thumbnails.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use exif::{In, Tag};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use super::CodecError;

/// EXIF orientation, applied before cropping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Normal,
    MirroredHorizontal,
    Rotate180,
    MirroredVertical,
    MirroredHorizontalAnd270Cw,
    Rotate90Cw,
    MirroredHorizontalAnd90Cw,
    Rotate270Cw,
}

impl Orientation {
    /// Reads the orientation tag of a file; `None` when it has no EXIF data.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
        let field = exif.get_field(Tag::Orientation, In::PRIMARY)?;
        field.value.get_uint(0).map(Self::from)
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => img,
            Self::MirroredHorizontal => img.fliph(),
            Self::Rotate180 => img.rotate180(),
            Self::MirroredVertical => img.flipv(),
            Self::MirroredHorizontalAnd270Cw => img.fliph().rotate270(),
            Self::Rotate90Cw => img.rotate90(),
            Self::MirroredHorizontalAnd90Cw => img.fliph().rotate90(),
            Self::Rotate270Cw => img.rotate270(),
        }
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::MirroredHorizontal,
            3 => Self::Rotate180,
            4 => Self::MirroredVertical,
            5 => Self::MirroredHorizontalAnd270Cw,
            6 => Self::Rotate90Cw,
            7 => Self::MirroredHorizontalAnd90Cw,
            8 => Self::Rotate270Cw,
            _ => Self::Normal,
        }
    }
}

/// Scales `img` to cover a `size`x`size` square and crops the overflow around
/// the center. Never letterboxes.
pub fn cover_square(img: &DynamicImage, size: u32) -> DynamicImage {
    img.resize_to_fill(size, size, FilterType::Lanczos3)
}

/// Full image path: decode `source`, orient, cover-crop, write JPEG to `dest`.
///
/// The output carries no EXIF block, so orientation is normalized by construction.
pub fn render_square_jpeg(
    source: &Path,
    dest: &Path,
    size: u32,
    quality: u8,
    orientation: Orientation,
) -> Result<(), CodecError> {
    let img = image::io::Reader::open(source)?.with_guessed_format()?.decode()?;
    let square = cover_square(&orientation.apply(img), size);
    let rgb = square.to_rgb8();

    let mut out = BufWriter::new(File::create(dest)?);
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    out.flush()?;
    Ok(())
}
