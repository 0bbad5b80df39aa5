use std::ffi::OsStr;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage, imageops};
use tracing::debug;

use crate::capabilities::Capabilities;
use crate::error::LoadError;

/// A decoded photo: upright, alpha flattened, plus its embedded ICC profile.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub pixels: RgbImage,
    pub icc_profile: Option<Vec<u8>>,
}

impl SourceImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            icc_profile: None,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Reads and decodes a photo file. HEIC/HEIF goes through the optional
/// decoder and fails with [`LoadError::MissingDecoder`] when it is absent.
pub fn load_file(path: &Path, caps: Capabilities) -> Result<SourceImage, LoadError> {
    let bytes = fs::read(path)?;
    let is_heif = path
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(Capabilities::is_heif_extension);
    let image = if is_heif {
        decode_heif(&bytes, caps)?
    } else {
        load_bytes(&bytes)?
    };
    debug!(
        path = %path.display(),
        width = image.pixels.width(),
        height = image.pixels.height(),
        icc = image.icc_profile.is_some(),
        "loaded image"
    );
    Ok(image)
}

/// Decodes an in-memory JPEG/PNG/GIF/BMP/WebP.
pub fn load_bytes(bytes: &[u8]) -> Result<SourceImage, LoadError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(LoadError::Unsupported("unrecognized image format".into()));
    }
    let mut decoder = reader.into_decoder()?;
    let icc_profile = decoder.icc_profile().unwrap_or_else(|err| {
        debug!("ignoring unreadable ICC profile: {err}");
        None
    });
    let decoded = DynamicImage::from_decoder(decoder)?;
    let pixels = flatten_onto_white(decoded);
    let orientation = read_orientation(bytes).unwrap_or(1);
    Ok(SourceImage {
        pixels: apply_orientation(pixels, orientation),
        icc_profile,
    })
}

/// Drops alpha by compositing over a white background.
pub fn flatten_onto_white(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let over = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([over(r), over(g), over(b)])
    })
}

fn read_orientation(bytes: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    debug!("exif orientation {value}");
    Some(value as u16)
}

// EXIF orientations 2..=8; anything else is left as stored.
fn apply_orientation(img: RgbImage, orientation: u16) -> RgbImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

#[cfg(feature = "heif")]
fn decode_heif(bytes: &[u8], caps: Capabilities) -> Result<SourceImage, LoadError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    if !caps.heif {
        return Err(LoadError::MissingDecoder("HEIC/HEIF"));
    }
    let heif_err = |err: libheif_rs::HeifError| LoadError::Unsupported(err.to_string());
    let lib = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(bytes).map_err(heif_err)?;
    let handle = ctx.primary_image_handle().map_err(heif_err)?;
    let icc_profile = handle.color_profile_raw().map(|profile| profile.data);
    let alpha = handle.has_alpha_channel();
    let chroma = if alpha { RgbChroma::Rgba } else { RgbChroma::Rgb };
    let decoded = lib
        .decode(&handle, ColorSpace::Rgb(chroma), None)
        .map_err(heif_err)?;
    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| LoadError::Unsupported("HEIF image has no interleaved plane".into()))?;
    let image = interleaved_to_image(plane.width, plane.height, plane.stride, plane.data, alpha)
        .ok_or_else(|| LoadError::Unsupported("HEIF plane size mismatch".into()))?;
    Ok(SourceImage {
        pixels: flatten_onto_white(image),
        icc_profile,
    })
}

/// Copies a row-padded interleaved RGB or RGBA plane into an image.
#[cfg_attr(not(feature = "heif"), allow(dead_code))]
fn interleaved_to_image(
    width: u32,
    height: u32,
    stride: usize,
    data: &[u8],
    alpha: bool,
) -> Option<DynamicImage> {
    let channels = if alpha { 4 } else { 3 };
    let row_len = width as usize * channels;
    if stride < row_len {
        return None;
    }
    let mut raw = Vec::with_capacity(row_len * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        raw.extend_from_slice(row.get(..row_len)?);
    }
    if alpha {
        image::RgbaImage::from_raw(width, height, raw).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8)
    }
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_bytes: &[u8], _caps: Capabilities) -> Result<SourceImage, LoadError> {
    Err(LoadError::MissingDecoder("HEIC/HEIF"))
}
