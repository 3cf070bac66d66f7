//! Conditioning image loading.

use std::time::Duration;

use base64::Engine;
use image::RgbImage;
use ltx_models::ImageSource;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Timeout for fetching a conditioning image.
pub const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches and decodes conditioning images.
#[derive(Clone)]
pub struct ImageLoader {
    http: reqwest::Client,
}

impl ImageLoader {
    pub fn new() -> MediaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(IMAGE_FETCH_TIMEOUT)
            .build()
            .map_err(|e| MediaError::image_fetch(e.to_string()))?;
        Ok(Self { http })
    }

    /// Load an image from either source as RGB.
    pub async fn load(&self, source: &ImageSource) -> MediaResult<RgbImage> {
        match source {
            ImageSource::Url(url) => self.load_from_url(url).await,
            ImageSource::Base64(data) => load_from_base64(data),
        }
    }

    /// Download an image and convert to RGB. Non-2xx responses are errors.
    pub async fn load_from_url(&self, url: &str) -> MediaResult<RgbImage> {
        debug!("Fetching conditioning image from {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::image_fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::image_fetch(format!("{} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::image_fetch(e.to_string()))?;

        decode_rgb(&bytes)
    }
}

/// Decode a base64 payload (optionally a `data:` URI) and convert to RGB.
pub fn load_from_base64(data: &str) -> MediaResult<RgbImage> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| MediaError::image_decode(format!("invalid base64: {}", e)))?;

    decode_rgb(&bytes)
}

fn decode_rgb(bytes: &[u8]) -> MediaResult<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn png_base64() -> String {
        base64::engine::general_purpose::STANDARD.encode(png_bytes())
    }

    #[test]
    fn test_base64_decodes_to_rgb() {
        let img = load_from_base64(&png_base64()).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_base64_data_uri() {
        let uri = format!("data:image/png;base64,{}", png_base64());
        assert!(load_from_base64(&uri).is_ok());
    }

    #[test]
    fn test_malformed_base64_is_decode_error() {
        let err = load_from_base64("not base64 at all!!").unwrap_err();
        assert!(matches!(err, MediaError::ImageDecode(_)));
    }

    #[test]
    fn test_non_image_bytes_is_decode_error() {
        let b64 = base64::engine::general_purpose::STANDARD.encode(b"hello world");
        let err = load_from_base64(&b64).unwrap_err();
        assert!(matches!(err, MediaError::ImageDecode(_)));
    }

    #[tokio::test]
    async fn test_load_from_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
            .mount(&server)
            .await;

        let loader = ImageLoader::new().unwrap();
        let img = loader
            .load(&ImageSource::Url(format!("{}/cat.png", server.uri())))
            .await
            .unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[tokio::test]
    async fn test_url_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = ImageLoader::new().unwrap();
        let err = loader
            .load_from_url(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ImageFetch(_)));
        assert!(err.to_string().contains("404"));
    }
}
