//! Inline images given as `data:` URIs.

use std::fmt::{self, Formatter, Display};
use base64::Engine;
use image::{
    ImageFormat,
    RgbaImage,
};


const DATA_URI_PREFIX: &'static str = "data:";
const DEFAULT_MIME: &'static str = "text/plain";


#[derive(Debug)]
pub enum DataUriError {
    NotDataUri,
    MissingComma,
    Base64(base64::DecodeError),
    Percent,
    UnsupportedMime(String),
    Image(image::ImageError),
}

impl Display for DataUriError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DataUriError::NotDataUri => f.write_str("not a data URI"),
            DataUriError::MissingComma => f.write_str("data URI has no comma"),
            DataUriError::Base64(e) => write!(f, "invalid base64 in data URI: {}", e),
            DataUriError::Percent => f.write_str("invalid percent escape in data URI"),
            DataUriError::UnsupportedMime(mime) => write!(f, "unsupported data URI image type {:?}", mime),
            DataUriError::Image(e) => write!(f, "data URI image failed to parse: {}", e),
        }
    }
}

impl std::error::Error for DataUriError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataUriError::Base64(e) => Some(e),
            DataUriError::Image(e) => Some(e),
            _ => None,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub data: Vec<u8>,
}

/// Parse `data:<mime>[;params][;base64],<data>`.
pub fn parse(text: &str) -> Result<DataUri, DataUriError> {
    let rest = text
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or(DataUriError::NotDataUri)?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or(DataUriError::MissingComma)?;

    let mut parts = meta.split(';');
    let mime = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let is_base64 = parts.any(|part| part.trim().eq_ignore_ascii_case("base64"));

    let data =
        if is_base64 {
            let cleaned = data
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect::<String>();
            base64::engine::general_purpose::STANDARD
                .decode(cleaned)
                .map_err(DataUriError::Base64)?
        } else {
            percent_decode(data)?
        };
    Ok(DataUri {
        mime: if mime.is_empty() { DEFAULT_MIME.to_owned() } else { mime },
        data,
    })
}

fn percent_decode(data: &str) -> Result<Vec<u8>, DataUriError> {
    let bytes = data.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or(DataUriError::Percent)?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

impl DataUri {
    /// Decode as an image. WebP is only accepted if `allow_webp`.
    pub fn decode_image(&self, allow_webp: bool) -> Result<RgbaImage, DataUriError> {
        let format = match self.mime.as_str() {
            "image/png" => ImageFormat::Png,
            "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
            "image/webp" if allow_webp => ImageFormat::WebP,
            _ => return Err(DataUriError::UnsupportedMime(self.mime.clone())),
        };
        image::load_from_memory_with_format(&self.data, format)
            .map(|image| image.to_rgba8())
            .map_err(DataUriError::Image)
    }
}


#[cfg(test)]
pub(crate) fn png_data_uri(image: &RgbaImage) -> String {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes.into_inner()),
    )
}

#[test]
fn test_parse_base64_png() {
    let image = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]));
    let uri = parse(&png_data_uri(&image)).unwrap();
    assert_eq!(uri.mime, "image/png");
    assert_eq!(uri.decode_image(false).unwrap(), image);
}

#[test]
fn test_parse_plain_and_errors() {
    let uri = parse("data:,hello%20world").unwrap();
    assert_eq!(uri.mime, "text/plain");
    assert_eq!(uri.data, b"hello world");
    assert!(matches!(uri.decode_image(true), Err(DataUriError::UnsupportedMime(_))));

    assert!(matches!(parse("image.png"), Err(DataUriError::NotDataUri)));
    assert!(matches!(parse("data:image/png;base64"), Err(DataUriError::MissingComma)));
    assert!(matches!(parse("data:image/png;base64,!!!"), Err(DataUriError::Base64(_))));
    assert!(matches!(parse("data:,%zz"), Err(DataUriError::Percent)));
}

#[test]
fn test_webp_only_when_allowed() {
    let uri = DataUri {
        mime: "image/webp".to_owned(),
        data: Vec::new(),
    };
    assert!(matches!(uri.decode_image(false), Err(DataUriError::UnsupportedMime(_))));
    assert!(matches!(uri.decode_image(true), Err(DataUriError::Image(_))));
}
