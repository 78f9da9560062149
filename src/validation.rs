use crate::error::ClassifyError;
use image::ImageReader;
use std::io::Cursor;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

pub const MIN_DIMENSION: u32 = 32;
pub const MAX_DIMENSION: u32 = 4096;

/// Check the file name carries one of the supported image extensions.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Verify that `data` decodes as an image within the size and dimension
/// limits. Returns `(width, height)`.
pub fn validate_image(data: &[u8], max_file_size: u64) -> Result<(u32, u32), ClassifyError> {
    if data.is_empty() {
        return Err(ClassifyError::ValidationError("File is empty".to_string()));
    }

    if data.len() as u64 > max_file_size {
        return Err(ClassifyError::ValidationError(format!(
            "File too large ({}, maximum {})",
            format_file_size(data.len() as u64),
            format_file_size(max_file_size)
        )));
    }

    let (width, height) = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_dimensions()?;

    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(ClassifyError::ValidationError(format!(
            "Image dimensions too small (minimum {}x{} pixels)",
            MIN_DIMENSION, MIN_DIMENSION
        )));
    }

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ClassifyError::ValidationError(format!(
            "Image dimensions too large (maximum {}x{} pixels)",
            MAX_DIMENSION, MAX_DIMENSION
        )));
    }

    Ok((width, height))
}

pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::new(width, height);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("cat.jpg"));
        assert!(allowed_file("CAT.JPEG"));
        assert!(allowed_file("archive.tar.webp"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("png"));
        assert!(!allowed_file(""));
    }

    #[test]
    fn test_validate_image_accepts_normal_image() {
        let data = png_bytes(64, 48);
        assert_eq!(validate_image(&data, 16 * 1024 * 1024).unwrap(), (64, 48));
    }

    #[test]
    fn test_validate_image_rejects_small_image() {
        let data = png_bytes(16, 64);
        let err = validate_image(&data, 16 * 1024 * 1024).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_validate_image_rejects_oversized_file() {
        let data = png_bytes(64, 64);
        let err = validate_image(&data, 10).unwrap_err();
        assert!(matches!(err, ClassifyError::ValidationError(_)));
    }

    #[test]
    fn test_validate_image_rejects_garbage() {
        assert!(validate_image(b"definitely not an image", 1024).is_err());
        assert!(validate_image(&[], 1024).is_err());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(16 * 1024 * 1024), "16.0 MB");
    }
}
