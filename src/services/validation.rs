use garde::Validate;

use crate::models::case::MediaKind;
use crate::models::detection::{Submission, UploadedFile};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "ogg", "flac"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

/// Files a single submission of each kind must carry.
pub fn required_file_count(kind: MediaKind) -> usize {
    match kind {
        MediaKind::Audio => 2,
        MediaKind::Image | MediaKind::Video => 1,
    }
}

pub fn allowed_extensions(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Image => IMAGE_EXTENSIONS,
        MediaKind::Audio => AUDIO_EXTENSIONS,
        MediaKind::Video => VIDEO_EXTENSIONS,
    }
}

/// Validate a submission before anything is recorded.
pub fn validate_submission(submission: &Submission) -> Result<(), ValidationError> {
    submission
        .validate_with(&submission.media_kind)
        .map_err(|report| {
            let messages: Vec<&str> = report.iter().map(|(_, error)| error.message()).collect();
            ValidationError(messages.join("; "))
        })
}

/// garde rule for `Submission::files`: count and extension whitelist.
pub fn check_uploads(files: &Vec<UploadedFile>, kind: &MediaKind) -> garde::Result {
    let expected = required_file_count(*kind);
    if files.len() != expected {
        let message = match kind {
            MediaKind::Audio => {
                "Exactly 2 audio files required for speaker verification".to_string()
            }
            _ => format!("Exactly {expected} {kind} file required, got {}", files.len()),
        };
        return Err(garde::Error::new(message));
    }

    for file in files {
        if !has_allowed_extension(&file.filename, *kind) {
            return Err(garde::Error::new(format!(
                "Unsupported {kind} format: {}. Supported: {}",
                file.filename,
                allowed_extensions(*kind).join(", ")
            )));
        }
        if file.bytes.is_empty() {
            return Err(garde::Error::new(format!("Empty upload: {}", file.filename)));
        }
    }

    Ok(())
}

fn has_allowed_extension(filename: &str, kind: MediaKind) -> bool {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    allowed_extensions(kind).contains(&ext.as_str())
}

/// Bad media format or file count.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);
