//! User-supplied video blobs and the single-video selection rule.
//!
//! A selection is accepted only when it holds exactly one file whose media
//! type is `video/*`. The accepted [`MediaBlob`] doubles as the preview
//! handle the presentation layer plays back.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::error::FilmstripError;

/// Extension to media type table used when no type is declared.
const VIDEO_EXTENSIONS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("ogv", "video/ogg"),
    ("mpg", "video/mpeg"),
    ("mpeg", "video/mpeg"),
    ("ts", "video/mp2t"),
    ("3gp", "video/3gpp"),
    ("flv", "video/x-flv"),
    ("wmv", "video/x-ms-wmv"),
];

/// Fallback for files whose extension is not recognised.
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// A user-supplied file together with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaBlob {
    path: PathBuf,
    media_type: String,
}

impl MediaBlob {
    /// Create a blob, guessing the media type from the file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let media_type = guess_media_type(&path).to_string();
        Self { path, media_type }
    }

    /// Create a blob with an explicitly declared media type.
    pub fn with_media_type<P: AsRef<Path>>(path: P, media_type: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            media_type: media_type.into().to_ascii_lowercase(),
        }
    }

    /// Location of the blob.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared media type, e.g. `video/mp4`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Returns `true` if the declared media type is `video/*`.
    pub fn is_video(&self) -> bool {
        self.media_type.starts_with("video/")
    }
}

impl fmt::Display for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.media_type)
    }
}

fn guess_media_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return UNKNOWN_MEDIA_TYPE;
    };
    let extension = extension.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == extension)
        .map_or(UNKNOWN_MEDIA_TYPE, |&(_, media_type)| media_type)
}

/// Accept a selection of files as the next video to sample.
///
/// # Errors
///
/// - [`FilmstripError::NoSelection`] if `candidates` is empty.
/// - [`FilmstripError::MultipleSelection`] if more than one file is offered;
///   the whole drop is rejected rather than picking one.
/// - [`FilmstripError::UnsupportedMedia`] if the file is not `video/*`.
///
/// # Example
///
/// ```
/// use filmstrip::{MediaBlob, select_video};
///
/// let blob = select_video([MediaBlob::from_path("clip.mp4")])?;
/// assert_eq!(blob.media_type(), "video/mp4");
/// # Ok::<(), filmstrip::FilmstripError>(())
/// ```
pub fn select_video<I>(candidates: I) -> Result<MediaBlob, FilmstripError>
where
    I: IntoIterator<Item = MediaBlob>,
{
    let mut candidates: Vec<MediaBlob> = candidates.into_iter().collect();
    match candidates.len() {
        0 => return Err(FilmstripError::NoSelection),
        1 => {}
        count => return Err(FilmstripError::MultipleSelection(count)),
    }

    let blob = candidates.remove(0);
    if !blob.is_video() {
        return Err(FilmstripError::UnsupportedMedia {
            path: blob.path.clone(),
            reason: format!("media type {} is not a video", blob.media_type),
        });
    }

    log::debug!("Accepted selection: {blob}");
    Ok(blob)
}
