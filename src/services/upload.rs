//! Request-level checks applied to uploads before the quota core sees them.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

const MAX_FILENAME_LEN: usize = 100;

/// MIME types accepted for upload, with the extensions each may carry.
const ALLOWED_TYPES: [(&str, &[&str]); 4] = [
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("content type `{0}` is not an accepted image type")]
    UnsupportedType(String),
    #[error("file extension does not match content type `{0}`")]
    ExtensionMismatch(String),
    #[error("payload is not valid base64")]
    InvalidEncoding,
    #[error("payload is empty")]
    Empty,
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

/// A validated upload ready for admission.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ValidatedUpload {
    /// Server-generated key: upload time in milliseconds plus the clean name.
    pub fn key_at(&self, now: DateTime<Utc>) -> String {
        format!("{}-{}", now.timestamp_millis(), self.filename)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`, collapse runs of dots,
/// strip leading dots and bound the length while keeping the extension.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let mut cleaned = String::with_capacity(base.len());
    for c in base.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '_'
        };
        // `..` is never a valid key segment
        if c == '.' && cleaned.ends_with('.') {
            continue;
        }
        cleaned.push(c);
    }
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        return "upload".to_string();
    }
    if cleaned.len() <= MAX_FILENAME_LEN {
        return cleaned;
    }

    // ascii only from here on, so byte slicing is safe
    match cleaned.rfind('.') {
        Some(dot) if cleaned.len() - dot <= 10 => {
            let ext = &cleaned[dot..];
            let stem = cleaned[..MAX_FILENAME_LEN - ext.len()].trim_end_matches('.');
            format!("{}{}", stem, ext)
        }
        _ => cleaned[..MAX_FILENAME_LEN].to_string(),
    }
}

fn extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Decode standard base64, tolerating a `data:<type>;base64,` prefix.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, UploadError> {
    let encoded = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact)
        .map_err(|_| UploadError::InvalidEncoding)
}

/// Validate the raw request fields and return the decoded upload.
pub fn validate(
    filename: &str,
    content_type: &str,
    data: &str,
    max_bytes: usize,
) -> Result<ValidatedUpload, UploadError> {
    if filename.trim().is_empty() {
        return Err(UploadError::MissingField("filename"));
    }
    if data.is_empty() {
        return Err(UploadError::MissingField("data"));
    }

    let content_type = content_type.trim().to_ascii_lowercase();
    let Some((_, extensions)) = ALLOWED_TYPES.iter().find(|(t, _)| *t == content_type) else {
        return Err(UploadError::UnsupportedType(content_type));
    };

    let filename = sanitize_filename(filename);
    match extension(&filename) {
        Some(ext) if extensions.contains(&ext.as_str()) => {}
        _ => return Err(UploadError::ExtensionMismatch(content_type)),
    }

    // cheap bound before decoding: 4 base64 chars carry 3 bytes
    if data.len() / 4 * 3 > max_bytes.saturating_mul(2).saturating_add(1024) {
        return Err(UploadError::TooLarge {
            size: data.len() / 4 * 3,
            limit: max_bytes,
        });
    }
    let bytes = decode_payload(data)?;
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    Ok(ValidatedUpload {
        filename,
        content_type,
        bytes: Bytes::from(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PIXEL: &str = "iVBORw0KGgo=";

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_filename("cat photo (1).png"), "cat_photo__1_.png");
        assert_eq!(sanitize_filename("../../etc/passwd.png"), "passwd.png");
        assert_eq!(sanitize_filename("C:\\Users\\me\\dog.jpg"), "dog.jpg");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename("ünïcødé.gif"), "_n_c_d_.gif");
        assert_eq!(sanitize_filename("my..photo.png"), "my.photo.png");
        assert_eq!(sanitize_filename("a...b....png"), "a.b.png");

        let long = format!("{}.webp", "a".repeat(300));
        let clean = sanitize_filename(&long);
        assert_eq!(clean.len(), MAX_FILENAME_LEN);
        assert!(clean.ends_with(".webp"));

        // the cut lands on a dot right before the extension
        let edge = format!("{}.{}.png", "a".repeat(95), "b".repeat(10));
        let clean = sanitize_filename(&edge);
        assert!(!clean.contains(".."));
        assert!(clean.ends_with("a.png"));
    }

    #[test]
    fn accepts_allowed_image() {
        let upload = validate("Cat.PNG", "image/png", PIXEL, 1024).unwrap();
        assert_eq!(upload.filename, "Cat.PNG");
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(upload.bytes.len(), 8);

        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(upload.key_at(now), "1700000000123-Cat.PNG");
    }

    #[test]
    fn accepts_data_url() {
        let data = format!("data:image/png;base64,{PIXEL}");
        assert_eq!(validate("a.png", "image/png", &data, 1024).unwrap().bytes.len(), 8);
    }

    #[test]
    fn rejects_bad_requests() {
        assert_eq!(
            validate("a.svg", "image/svg+xml", PIXEL, 1024).unwrap_err(),
            UploadError::UnsupportedType("image/svg+xml".into())
        );
        assert_eq!(
            validate("a.exe", "image/png", PIXEL, 1024).unwrap_err(),
            UploadError::ExtensionMismatch("image/png".into())
        );
        assert_eq!(
            validate("a.png", "image/png", "not base64!", 1024).unwrap_err(),
            UploadError::InvalidEncoding
        );
        assert_eq!(
            validate("", "image/png", PIXEL, 1024).unwrap_err(),
            UploadError::MissingField("filename")
        );
        assert_eq!(
            validate("a.png", "image/png", PIXEL, 4).unwrap_err(),
            UploadError::TooLarge { size: 8, limit: 4 }
        );
    }
}
