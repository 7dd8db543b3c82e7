//! Media type handling for recorded input and converted output
//!
//! Browsers report recordings as `audio/webm;codecs=opus` (sometimes `video/webm`),
//! while the upload target only accepts `audio/mpeg`.

use crate::config::OUTPUT_MEDIA_TYPE;
use tracing::debug;

/// Leading bytes of every EBML document (Matroska / WebM)
pub const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// A parsed media type such as `audio/webm;codecs=opus`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    codecs: Vec<String>,
}

impl MediaType {
    /// Parse a media type string. Returns `None` when there is no `type/subtype` essence.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();

        let (kind, subtype) = essence.split_once('/')?;
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut codecs = Vec::new();
        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("codecs") {
                codecs.extend(
                    value
                        .trim()
                        .trim_matches('"')
                        .split(',')
                        .map(|c| c.trim().to_ascii_lowercase())
                        .filter(|c| !c.is_empty()),
                );
            }
        }

        Some(Self { essence, codecs })
    }

    pub fn essence(&self) -> &str {
        &self.essence
    }

    pub fn codecs(&self) -> &[String] {
        &self.codecs
    }

    /// `audio/webm` or `video/webm`
    pub fn is_webm(&self) -> bool {
        matches!(self.essence.as_str(), "audio/webm" | "video/webm")
    }

    /// WebM whose codec list is absent or names Opus
    pub fn is_webm_opus(&self) -> bool {
        self.is_webm() && (self.codecs.is_empty() || self.codecs.iter().any(|c| c == "opus"))
    }
}

/// Media type helpers for the conversion boundary
pub struct MediaTypes;

impl MediaTypes {
    /// Guess a media type from leading magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
        if bytes.starts_with(&EBML_MAGIC) {
            Some("audio/webm")
        } else if bytes.starts_with(b"OggS") {
            Some("audio/ogg")
        } else if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
            Some(OUTPUT_MEDIA_TYPE)
        } else if bytes.starts_with(b"RIFF") {
            Some("audio/wav")
        } else {
            None
        }
    }

    /// Resolve the effective media type of an input: the declared one, or a sniffed
    /// one when nothing was declared
    pub fn resolve(declared: &str, bytes: &[u8]) -> Option<MediaType> {
        if declared.trim().is_empty() {
            let sniffed = Self::sniff(bytes)?;
            debug!("No media type declared, inferred {}", sniffed);
            MediaType::parse(sniffed)
        } else {
            MediaType::parse(declared)
        }
    }

    /// Check if a media type needs conversion before an MP3-only upload
    pub fn needs_conversion(media_type: &str) -> bool {
        match MediaType::parse(media_type) {
            Some(parsed) => !matches!(parsed.essence(), "audio/mpeg" | "audio/mp3"),
            None => true,
        }
    }

    /// File extension for a media type
    pub fn extension(media_type: &str) -> &'static str {
        let essence = MediaType::parse(media_type)
            .map(|m| m.essence().to_string())
            .unwrap_or_default();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/webm" | "video/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/wav" => "wav",
            _ => "bin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_browser_types() {
        let m = MediaType::parse("audio/webm;codecs=opus").unwrap();
        assert_eq!(m.essence(), "audio/webm");
        assert_eq!(m.codecs(), &["opus".to_string()]);
        assert!(m.is_webm_opus());

        let m = MediaType::parse("Video/WebM; codecs=\"vp8, opus\"").unwrap();
        assert!(m.is_webm_opus());

        let m = MediaType::parse("audio/webm").unwrap();
        assert!(m.is_webm_opus());
    }

    #[test]
    fn test_rejects_other_codecs_and_types() {
        assert!(!MediaType::parse("audio/webm;codecs=vorbis").unwrap().is_webm_opus());
        assert!(!MediaType::parse("audio/ogg;codecs=opus").unwrap().is_webm_opus());
        assert!(MediaType::parse("webm").is_none());
        assert!(MediaType::parse("audio/").is_none());
    }

    #[test]
    fn test_sniff_and_resolve() {
        assert_eq!(MediaTypes::sniff(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]), Some("audio/webm"));
        assert_eq!(MediaTypes::sniff(b"OggS\0"), Some("audio/ogg"));
        assert_eq!(MediaTypes::sniff(&[0xFF, 0xFB, 0x90, 0x00]), Some("audio/mpeg"));
        assert_eq!(MediaTypes::sniff(b"hello"), None);

        let resolved = MediaTypes::resolve("", &EBML_MAGIC).unwrap();
        assert!(resolved.is_webm_opus());
        assert!(MediaTypes::resolve("  ", b"junk").is_none());
    }

    #[test]
    fn test_needs_conversion_and_extension() {
        assert!(MediaTypes::needs_conversion("audio/webm;codecs=opus"));
        assert!(!MediaTypes::needs_conversion("audio/mpeg"));
        assert_eq!(MediaTypes::extension("audio/mpeg"), "mp3");
        assert_eq!(MediaTypes::extension("audio/webm;codecs=opus"), "webm");
    }
}
