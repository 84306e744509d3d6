use exif::{In, Reader, Tag, Value};
use image::{ColorType, DynamicImage, ImageFormat, ImageReader, RgbImage};
use sha2::{Digest, Sha256};
use shared::ImageMetadata;
use std::collections::BTreeMap;
use std::io::Cursor;

/// EXIF fields reported back to the caller.
const REPORTED_TAGS: [(&str, Tag); 4] = [
    ("Make", Tag::Make),
    ("Model", Tag::Model),
    ("DateTime", Tag::DateTime),
    ("Software", Tag::Software),
];

/// Any of these populated means the file came out of a camera pipeline.
const CAMERA_TAGS: [Tag; 4] = [Tag::Make, Tag::Model, Tag::LensMake, Tag::LensModel];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("The uploaded file is empty")]
    Empty,
    #[error("Unrecognized image format")]
    UnknownFormat,
    #[error("Could not load image: {0}")]
    Corrupt(#[from] image::ImageError),
}

/// A decoded upload. Built once per request and never mutated.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pixels: RgbImage,
    format: Option<ImageFormat>,
    mode: String,
    byte_len: usize,
    sha256: String,
    exif: BTreeMap<String, String>,
    camera_exif: bool,
}

impl ImageSample {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn format_name(&self) -> Option<String> {
        self.format.map(format_name)
    }

    pub fn has_camera_exif(&self) -> bool {
        self.camera_exif
    }

    pub fn metadata(&self) -> ImageMetadata {
        ImageMetadata {
            width: self.width(),
            height: self.height(),
            format: self.format_name(),
            mode: self.mode.clone(),
            size_bytes: self.byte_len,
            sha256: self.sha256.clone(),
            exif: if self.exif.is_empty() {
                None
            } else {
                Some(self.exif.clone())
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn synthetic(width: u32, height: u32, camera_exif: bool) -> Self {
        let mut exif = BTreeMap::new();
        if camera_exif {
            exif.insert("Make".to_string(), "Canon".to_string());
        }
        Self {
            pixels: RgbImage::new(width, height),
            format: Some(ImageFormat::Png),
            mode: "RGB".to_string(),
            byte_len: 0,
            sha256: String::new(),
            exif,
            camera_exif,
        }
    }
}

/// Decodes raw upload bytes into an [`ImageSample`].
pub fn normalize(bytes: &[u8]) -> Result<ImageSample, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::Corrupt(image::ImageError::IoError(e)))?;
    let format = reader.format().ok_or(DecodeError::UnknownFormat)?;
    let image = reader.decode()?;

    let mode = color_mode(&image);
    let (exif, camera_exif) = read_exif(bytes);

    let mut hasher = Sha256::new();
    hasher.update(bytes);

    Ok(ImageSample {
        pixels: image.to_rgb8(),
        format: Some(format),
        mode,
        byte_len: bytes.len(),
        sha256: hex::encode(hasher.finalize()),
        exif,
        camera_exif,
    })
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

fn color_mode(image: &DynamicImage) -> String {
    match image.color() {
        ColorType::L8 => "L".to_string(),
        ColorType::La8 => "LA".to_string(),
        ColorType::Rgb8 => "RGB".to_string(),
        ColorType::Rgba8 => "RGBA".to_string(),
        ColorType::L16 => "I;16".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

/// Missing or malformed EXIF is treated as "no EXIF", never as a decode failure.
fn read_exif(bytes: &[u8]) -> (BTreeMap<String, String>, bool) {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(e) => {
            log::debug!("No usable EXIF block: {}", e);
            return (BTreeMap::new(), false);
        }
    };

    let fields = REPORTED_TAGS
        .iter()
        .filter_map(|&(name, tag)| text_field(&exif, tag).map(|v| (name.to_string(), v)))
        .collect();
    let camera_exif = CAMERA_TAGS
        .iter()
        .any(|&tag| text_field(&exif, tag).is_some());

    (fields, camera_exif)
}

fn text_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let text = match &field.value {
        Value::Ascii(parts) => parts
            .iter()
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        _ => field.display_value().to_string(),
    };
    let text = text.trim_matches(char::from(0)).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
