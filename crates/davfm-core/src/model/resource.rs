//! Resource representation.

use std::time::SystemTime;

use unicode_normalization::UnicodeNormalization;

use crate::model::host::HostId;

/// Image file extensions used as a fallback when no mime type is known.
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "ico", "tiff", "tif",
];

/// A single file or directory entry on a backend.
///
/// `Resource` is immutable — create new instances via [`Resource::new`]
/// rather than mutating existing ones. Directory sizes are reported as `0`.
///
/// Equality compares every field, which is what change detection wants: two
/// listings of the same path taken at different times differ once a
/// timestamp ticks. Identity — "is this the same entry" — is the weaker
/// [`Resource::same_entry`], which compares only `(host, absolute_path)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    absolute_path: String,
    name: String,
    mime_type: String,
    size: i64,
    created: Option<SystemTime>,
    modified: Option<SystemTime>,
    directory: bool,
    host: HostId,
}

impl Resource {
    /// Creates a new `Resource`. The name is NFC-normalized so that entries
    /// coming from NFD filesystems (macOS) or WebDAV servers compare equal
    /// to user-supplied paths.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        absolute_path: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: i64,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
        directory: bool,
        host: HostId,
    ) -> Self {
        let name: String = name.into();
        Self {
            absolute_path: absolute_path.into(),
            name: name.nfc().collect(),
            mime_type: mime_type.into(),
            size: if directory { 0 } else { size },
            created,
            modified,
            directory,
            host,
        }
    }

    /// Creates a bare directory resource, used for tree roots.
    pub fn directory(
        absolute_path: impl Into<String>,
        name: impl Into<String>,
        host: HostId,
    ) -> Self {
        Self::new(
            absolute_path,
            name,
            "inode/directory",
            0,
            None,
            None,
            true,
            host,
        )
    }

    /// Returns the absolute path of this entry on its backend.
    pub fn path(&self) -> &str {
        &self.absolute_path
    }

    /// Returns the entry name (last path segment).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the mime type reported by the backend.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Returns the size in bytes. Always `0` for directories.
    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn created(&self) -> Option<SystemTime> {
        self.created
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    /// The host this entry lives on.
    pub fn host(&self) -> &HostId {
        &self.host
    }

    /// Identity comparison: same backend entry, regardless of metadata.
    pub fn same_entry(&self, other: &Resource) -> bool {
        self.host == other.host && self.absolute_path == other.absolute_path
    }

    /// Returns the lowercase file extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.name.rsplit('/').next().unwrap_or(&self.name);
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_lowercase())
    }

    /// Returns `true` if the entry is a raster image.
    pub fn is_image(&self) -> bool {
        if self.directory {
            return false;
        }
        if self.mime_type.starts_with("image/") {
            return true;
        }
        self.extension()
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Returns `true` if the entry is a PDF document.
    pub fn is_pdf(&self) -> bool {
        !self.directory
            && (self.mime_type == "application/pdf"
                || self.extension().map(|e| e == "pdf").unwrap_or(false))
    }

    /// Returns `true` if the entry is playable audio. DSD streams are
    /// served as `octet-stream` by most servers, so `.dsf` is special-cased.
    pub fn is_audio(&self) -> bool {
        !self.directory
            && (self.mime_type.starts_with("audio/")
                || (self.mime_type.contains("octet-stream")
                    && self.absolute_path.ends_with("dsf")))
    }

    /// Returns `true` if the entry is playable video.
    pub fn is_video(&self) -> bool {
        !self.directory && self.mime_type.starts_with("video/")
    }
}

/// Formats a byte count for display, binary units, integer precision.
pub fn format_size(bytes: i64) -> String {
    const KIB: i64 = 1024;
    const MIB: i64 = KIB * 1024;
    const GIB: i64 = MIB * 1024;
    if bytes < 0 {
        String::new()
    } else if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{} KB", bytes / KIB)
    } else if bytes < GIB {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{} GB", bytes / GIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostId {
        HostId::new("https://dav.example.com/files")
    }

    fn file(path: &str, name: &str, mime: &str) -> Resource {
        Resource::new(path, name, mime, 100, None, None, false, host())
    }

    #[test]
    fn directory_size_is_zero() {
        let res = Resource::new(
            "/files/music",
            "music",
            "httpd/unix-directory",
            4096,
            None,
            None,
            true,
            host(),
        );
        assert!(res.is_directory());
        assert_eq!(res.size(), 0);
    }

    #[test]
    fn file_keeps_size() {
        let res = file("/files/a.txt", "a.txt", "text/plain");
        assert_eq!(res.size(), 100);
        assert!(!res.is_directory());
    }

    #[test]
    fn same_entry_ignores_metadata() {
        let a = file("/files/a.txt", "a.txt", "text/plain");
        let b = Resource::new(
            "/files/a.txt",
            "a.txt",
            "text/plain",
            999,
            None,
            Some(SystemTime::now()),
            false,
            host(),
        );
        assert!(a.same_entry(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn same_entry_distinguishes_hosts() {
        let a = file("/files/a.txt", "a.txt", "text/plain");
        let b = Resource::new(
            "/files/a.txt",
            "a.txt",
            "text/plain",
            100,
            None,
            None,
            false,
            HostId::new("file:///"),
        );
        assert!(!a.same_entry(&b));
    }

    #[test]
    fn full_equality_on_identical_fields() {
        let a = file("/files/a.txt", "a.txt", "text/plain");
        let b = file("/files/a.txt", "a.txt", "text/plain");
        assert_eq!(a, b);
    }

    #[test]
    fn extension_lowercased() {
        let res = file("/files/PIC.JPG", "PIC.JPG", "application/octet-stream");
        assert_eq!(res.extension(), Some("jpg".to_string()));
    }

    #[test]
    fn extension_absent() {
        let res = file("/files/Makefile", "Makefile", "text/plain");
        assert_eq!(res.extension(), None);
    }

    #[test]
    fn dotfile_has_no_extension() {
        let res = file("/files/.bashrc", ".bashrc", "text/plain");
        assert_eq!(res.extension(), None);
    }

    #[test]
    fn is_image_by_mime() {
        assert!(file("/f/p.bin", "p.bin", "image/png").is_image());
    }

    #[test]
    fn is_image_by_extension_fallback() {
        assert!(file("/f/p.webp", "p.webp", "application/octet-stream").is_image());
        assert!(!file("/f/p.txt", "p.txt", "application/octet-stream").is_image());
    }

    #[test]
    fn is_pdf() {
        assert!(file("/f/doc.pdf", "doc.pdf", "application/pdf").is_pdf());
        assert!(file("/f/doc.pdf", "doc.pdf", "application/octet-stream").is_pdf());
        assert!(!file("/f/doc.txt", "doc.txt", "text/plain").is_pdf());
    }

    #[test]
    fn is_audio_includes_dsf_octet_stream() {
        assert!(file("/f/track.flac", "track.flac", "audio/flac").is_audio());
        assert!(file("/f/track.dsf", "track.dsf", "application/octet-stream").is_audio());
        assert!(!file("/f/track.txt", "track.txt", "text/plain").is_audio());
    }

    #[test]
    fn is_video_by_mime() {
        assert!(file("/f/clip.mkv", "clip.mkv", "video/x-matroska").is_video());
        assert!(!file("/f/clip.mkv", "clip.mkv", "application/octet-stream").is_video());
    }

    #[test]
    fn directories_are_never_media() {
        let dir = Resource::directory("/f/pics.pdf", "pics.pdf", host());
        assert!(!dir.is_image());
        assert!(!dir.is_pdf());
        assert!(!dir.is_audio());
        assert!(!dir.is_video());
    }

    #[test]
    fn name_is_nfc_normalized() {
        // "é" as 'e' + combining acute accent, NFD
        let res = file("/f/cafe\u{0301}.txt", "cafe\u{0301}.txt", "text/plain");
        assert_eq!(res.name(), "caf\u{00e9}.txt");
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_size(-1), "");
    }
}
