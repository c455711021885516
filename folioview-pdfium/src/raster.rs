use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use folioview_core::{RasterBuffer, Rotation};
use image::{imageops, ImageFormat, RgbaImage};

fn to_image(buffer: &RasterBuffer) -> Result<RgbaImage> {
    RgbaImage::from_raw(buffer.width, buffer.height, buffer.pixels.clone()).ok_or_else(|| {
        anyhow!(
            "raster buffer of {}x{} has {} bytes",
            buffer.width,
            buffer.height,
            buffer.pixels.len()
        )
    })
}

fn from_image(image: RgbaImage) -> Result<RasterBuffer> {
    let (width, height) = image.dimensions();
    RasterBuffer::new(width, height, image.into_raw())
}

/// Encodes an RGBA raster (a page or a region crop) as PNG.
pub fn encode_png(buffer: &RasterBuffer) -> Result<Vec<u8>> {
    let image = to_image(buffer)?;
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(out)
}

pub fn save_png(buffer: &RasterBuffer, path: &Path) -> Result<()> {
    to_image(buffer)?
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {:?}", path))
}

/// Turns an unrotated page raster clockwise by `rotation`.
pub fn rotate_raster(buffer: RasterBuffer, rotation: Rotation) -> Result<RasterBuffer> {
    if rotation == Rotation::Deg0 {
        return Ok(buffer);
    }
    let image = to_image(&buffer)?;
    let rotated = match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    };
    from_image(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn gradient(width: u32, height: u32) -> RasterBuffer {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        RasterBuffer::new(width, height, pixels).unwrap()
    }

    #[test]
    fn png_output_decodes_to_the_same_pixels() {
        let buffer = gradient(12, 7);
        let bytes = encode_png(&buffer).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.dimensions(), (12, 7));
        assert_eq!(decoded.into_raw(), buffer.pixels);
    }

    #[test]
    fn save_writes_a_png_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.png");
        save_png(&gradient(4, 4), &path).unwrap();
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (4, 4));
    }

    #[test]
    fn quarter_turn_swaps_dimensions_and_moves_corners() {
        let buffer = gradient(6, 3);
        let rotated = rotate_raster(buffer.clone(), Rotation::Deg90).unwrap();
        assert_eq!((rotated.width, rotated.height), (3, 6));
        // the unrotated bottom-left pixel lands top-left after a clockwise turn
        assert_eq!(&rotated.pixels[..4], &[0, 2, 0, 255]);

        let half = rotate_raster(buffer.clone(), Rotation::Deg180).unwrap();
        assert_eq!((half.width, half.height), (6, 3));
        assert_eq!(&half.pixels[..4], &[5, 2, 0, 255]);

        assert_eq!(rotate_raster(buffer.clone(), Rotation::Deg0).unwrap(), buffer);
    }
}
