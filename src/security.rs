use crate::errors::{AppError, AppResult};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Largest video the media endpoint accepts for chunked uploads.
pub const MAX_MEDIA_SIZE_BYTES: usize = 512 * 1024 * 1024;

fn video_mime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^video/[a-z0-9][a-z0-9!#$&^_.+\-]{0,126}$").expect("valid MIME regex")
    })
}

fn unsafe_filename_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid filename regex"))
}

pub struct InputValidator;

impl InputValidator {
    pub fn validate_media_buffer(buffer: &[u8]) -> AppResult<()> {
        if buffer.is_empty() {
            return Err(AppError::validation(
                "buffer",
                "Upload requires at least one byte of media",
            ));
        }

        if buffer.len() > MAX_MEDIA_SIZE_BYTES {
            return Err(AppError::MediaTooLarge { size: buffer.len() });
        }

        Ok(())
    }

    /// Returns the trimmed, lowercased content type that passed validation.
    pub fn validate_content_type(content_type: &str) -> AppResult<String> {
        let normalized = content_type.trim().to_ascii_lowercase();
        if !video_mime_pattern().is_match(&normalized) {
            return Err(AppError::invalid_content_type(content_type));
        }
        Ok(normalized)
    }

    pub fn validate_file_name(file_name: &str) -> AppResult<()> {
        if file_name.trim().is_empty() {
            return Err(AppError::validation("file_name", "File name cannot be empty"));
        }
        Ok(())
    }

    pub fn sanitize_filename(filename: &str) -> String {
        // Strip any directory components the client sent along
        let base = Path::new(filename.trim())
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.trim().to_string());
        let sanitized = unsafe_filename_chars().replace_all(&base, "_");

        // Limit length
        if sanitized.len() > 255 {
            let mut end = 252;
            while !sanitized.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &sanitized[..end])
        } else {
            sanitized.to_string()
        }
    }

    /// File extension used for APPEND segment names, e.g. `mp4` for `clip.MP4`.
    pub fn segment_extension(file_name: &str) -> String {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "mp4".to_string())
    }

    /// Guess a video MIME type from a file extension.
    pub fn content_type_for_path(path: &str) -> &'static str {
        match Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("mp4") | Some("m4v") => "video/mp4",
            Some("mov") => "video/quicktime",
            Some("webm") => "video/webm",
            Some("mkv") => "video/x-matroska",
            Some("avi") => "video/x-msvideo",
            _ => "video/mp4", // Default fallback
        }
    }
}
