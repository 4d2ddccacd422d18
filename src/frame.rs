//! Captured still frames.
//!
//! A [`Frame`] is an immutable, self-contained encoded image together with
//! its position in the run (`index`) and in the video (`timestamp`). The
//! presentation layer can hand [`Frame::image_data`] straight to anything
//! that displays PNG or JPEG bytes.

use std::{fmt, io::Cursor, time::Duration};

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};

use crate::error::FilmstripError;

/// How a captured picture is encoded into [`Frame::image_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageEncoding {
    /// Lossless PNG. This is the default.
    #[default]
    Png,
    /// JPEG at the given quality (1 – 100). Alpha is dropped.
    Jpeg {
        /// Encoder quality, clamped to 1 – 100.
        quality: u8,
    },
}

impl ImageEncoding {
    /// MIME type of the encoded bytes.
    pub fn media_type(self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg { .. } => "image/jpeg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            ImageEncoding::Png => ImageFormat::Png,
            ImageEncoding::Jpeg { .. } => ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageEncoding::Png => f.write_str("png"),
            ImageEncoding::Jpeg { quality } => write!(f, "jpeg (q{quality})"),
        }
    }
}

/// A still image captured at one sample timestamp.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    index: u64,
    timestamp: Duration,
    width: u32,
    height: u32,
    encoding: ImageEncoding,
    image_data: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .field("image_bytes", &self.image_data.len())
            .finish()
    }
}

impl Frame {
    /// Wrap already-encoded image bytes.
    pub fn new(
        index: u64,
        timestamp: Duration,
        width: u32,
        height: u32,
        encoding: ImageEncoding,
        image_data: Vec<u8>,
    ) -> Self {
        Self {
            index,
            timestamp,
            width,
            height,
            encoding,
            image_data,
        }
    }

    /// Encode a rasterized picture into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`FilmstripError::ImageError`] if the encoder rejects the
    /// picture.
    pub fn encode(
        index: u64,
        timestamp: Duration,
        picture: &DynamicImage,
        encoding: ImageEncoding,
    ) -> Result<Self, FilmstripError> {
        let mut buffer = Cursor::new(Vec::new());
        match encoding {
            ImageEncoding::Png => picture.write_to(&mut buffer, ImageFormat::Png)?,
            ImageEncoding::Jpeg { quality } => {
                let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
                encoder.encode_image(&picture.to_rgb8())?;
            }
        }

        Ok(Self {
            index,
            timestamp,
            width: picture.width(),
            height: picture.height(),
            encoding,
            image_data: buffer.into_inner(),
        })
    }

    /// Zero-based capture position within the run.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Position in the video this frame was sampled at.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encoding of [`image_data`](Frame::image_data).
    pub fn encoding(&self) -> ImageEncoding {
        self.encoding
    }

    /// The encoded image bytes.
    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }

    /// Decode the image bytes back into pixels.
    ///
    /// # Errors
    ///
    /// Returns [`FilmstripError::ImageError`] if the bytes are not a valid
    /// image of the recorded encoding.
    pub fn to_image(&self) -> Result<DynamicImage, FilmstripError> {
        Ok(image::load_from_memory_with_format(
            &self.image_data,
            self.encoding.image_format(),
        )?)
    }
}
