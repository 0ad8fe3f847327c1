//! Image format sniffing for uploads and query images.

use crate::error::EmbeddingError;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG format
    Png,
    /// JPEG format
    Jpeg,
    /// GIF format
    Gif,
    /// WebP format
    WebP,
}

impl ImageFormat {
    /// Detect image format from magic bytes.
    pub fn detect_from_bytes(bytes: &[u8]) -> Result<Self, EmbeddingError> {
        if bytes.len() < 4 {
            return Err(EmbeddingError::CorruptImage(
                "too small to be a valid image".to_string(),
            ));
        }

        // PNG: 89 50 4E 47
        if bytes.starts_with(&[0x89, 0x50, 0x4e, 0x47]) {
            return Ok(ImageFormat::Png);
        }

        // JPEG: FF D8 FF
        if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
            return Ok(ImageFormat::Jpeg);
        }

        // GIF87a / GIF89a
        if bytes.starts_with(b"GIF") {
            return Ok(ImageFormat::Gif);
        }

        // WebP: RIFF ... WEBP
        if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && bytes[8..12] == *b"WEBP" {
            return Ok(ImageFormat::WebP);
        }

        Err(EmbeddingError::UnsupportedFormat(
            "unrecognised file header".to_string(),
        ))
    }

    /// Map a declared MIME type to a format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// Sniff the bytes and cross-check a declared MIME type.
    ///
    /// Generic types such as `application/octet-stream` are accepted and the
    /// sniffed format wins; a specific image type that disagrees with the
    /// bytes is rejected.
    pub fn resolve(bytes: &[u8], declared: Option<&str>) -> Result<Self, EmbeddingError> {
        let detected = Self::detect_from_bytes(bytes)?;
        if let Some(mime) = declared {
            let is_image_type = mime.trim().to_ascii_lowercase().starts_with("image/");
            match Self::from_mime(mime) {
                Some(declared) if declared != detected => {
                    return Err(EmbeddingError::UnsupportedFormat(format!(
                        "declared {} but content is {}",
                        mime,
                        detected.mime()
                    )));
                }
                None if is_image_type => {
                    return Err(EmbeddingError::UnsupportedFormat(mime.to_string()));
                }
                _ => {}
            }
        }
        Ok(detected)
    }

    /// File extension used for stored blobs.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
        }
    }

    /// Canonical MIME type.
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
        }
    }

    /// Decoder hint for the `image` crate.
    pub fn decoder_format(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Gif => image::ImageFormat::Gif,
            ImageFormat::WebP => image::ImageFormat::WebP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_png_format() {
        let png_bytes = vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
        let format = ImageFormat::detect_from_bytes(&png_bytes).unwrap();
        assert_eq!(format, ImageFormat::Png);
    }

    #[test]
    fn test_detect_jpeg_format() {
        let jpeg_bytes = vec![0xff, 0xd8, 0xff, 0xe0];
        let format = ImageFormat::detect_from_bytes(&jpeg_bytes).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_detect_webp_format() {
        let mut webp_bytes = b"RIFF".to_vec();
        webp_bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        webp_bytes.extend_from_slice(b"WEBP");
        let format = ImageFormat::detect_from_bytes(&webp_bytes).unwrap();
        assert_eq!(format, ImageFormat::WebP);
    }

    #[test]
    fn test_invalid_format() {
        let result = ImageFormat::detect_from_bytes(&[0x00, 0x00, 0x00, 0x00]);
        assert!(matches!(result, Err(EmbeddingError::UnsupportedFormat(_))));

        let result = ImageFormat::detect_from_bytes(&[0x89]);
        assert!(matches!(result, Err(EmbeddingError::CorruptImage(_))));
    }

    #[test]
    fn test_resolve_with_declared_mime() {
        let png = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a];
        assert_eq!(
            ImageFormat::resolve(&png, Some("image/png")).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(
            ImageFormat::resolve(&png, Some("application/octet-stream")).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(ImageFormat::resolve(&png, None).unwrap(), ImageFormat::Png);
        assert!(ImageFormat::resolve(&png, Some("image/jpeg")).is_err());
        assert!(ImageFormat::resolve(&png, Some("image/bmp")).is_err());
    }

    #[test]
    fn test_extension_and_mime() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Jpeg.mime(), "image/jpeg");
        assert_eq!(ImageFormat::from_mime("image/PNG; charset=binary"), Some(ImageFormat::Png));
    }
}
