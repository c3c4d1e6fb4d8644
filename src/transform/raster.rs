//! Raster image recompression.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::Result;

/// JPEG quality for every recompressed image.
pub const JPEG_QUALITY: u8 = 50;

/// Decode `bytes`, shrink to at most `max_width` pixels wide and re-encode
/// as JPEG. Aspect ratio is preserved; images already narrow enough keep
/// their size but are still recompressed.
pub fn shrink_to_jpeg(bytes: &[u8], max_width: u32) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let img = resize_to_width(img, max_width);

    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY).encode_image(&img.to_rgb8())?;
    Ok(output)
}

fn resize_to_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let width = max_width.min(img.width()).max(1);
    if width == img.width() {
        return img;
    }
    let height = ((img.height() as u64 * width as u64) / img.width() as u64).max(1) as u32;
    img.resize_exact(width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_wide_image_shrunk_to_jpeg() {
        let jpeg = shrink_to_jpeg(&png(400, 200), 100).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_narrow_image_keeps_size() {
        let jpeg = shrink_to_jpeg(&png(40, 30), 100).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn test_undecodable_bytes_fail() {
        assert!(matches!(
            shrink_to_jpeg(b"definitely not an image", 100),
            Err(ProxyError::ImageDecode(_))
        ));
    }
}
