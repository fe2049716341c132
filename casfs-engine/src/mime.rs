//! Best-effort MIME type inference from a path's extension, used by
//! `writeFile` when creating a brand-new `FileNode` (spec §4.4.1).

/// Returns the MIME type for `path`'s extension, or
/// `application/octet-stream` if the extension is absent or unrecognized.
pub fn guess_mime_type(path: &str) -> String {
    let ext = path.rsplit('.').next().filter(|e| *e != path).unwrap_or("");

    match ext.to_ascii_lowercase().as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "js" => "text/javascript",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_common_extensions() {
        assert_eq!(guess_mime_type("/a/b.txt"), "text/plain");
        assert_eq!(guess_mime_type("/a/b.json"), "application/json");
    }

    #[test]
    fn falls_back_to_octet_stream() {
        assert_eq!(guess_mime_type("/a/b"), "application/octet-stream");
        assert_eq!(guess_mime_type("/a/b.unknownext"), "application/octet-stream");
    }

    #[test]
    fn dotfile_with_no_extension_falls_back() {
        assert_eq!(guess_mime_type("/.gitignore"), "application/octet-stream");
    }
}
