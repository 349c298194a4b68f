use std::path::{Path, PathBuf};

/// Build the local path for a course file artifact.
///
/// Each file gets its own directory so that stale versions can be removed
/// with a single recursive delete even when the server-side filename changed:
/// `<root>/Files/course-<courseID>/file-<fileID>/<filename>`.
pub fn course_file_path(
    offline_root: &Path,
    course_id: &str,
    file_id: &str,
    display_name: &str,
) -> PathBuf {
    course_file_dir(offline_root, course_id, file_id).join(clean_filename(display_name))
}

/// Directory holding a single course file artifact.
pub fn course_file_dir(offline_root: &Path, course_id: &str, file_id: &str) -> PathBuf {
    offline_root
        .join("Files")
        .join(format!("course-{}", course_id))
        .join(format!("file-{}", file_id))
}

/// Local path for a rendered page body:
/// `<root>/Pages/course-<courseID>/<slug>.html`.
pub fn course_page_path(offline_root: &Path, course_id: &str, page_slug: &str) -> PathBuf {
    offline_root
        .join("Pages")
        .join(format!("course-{}", course_id))
        .join(format!("{}.html", clean_filename(page_slug)))
}

/// Directory holding one hosted video and its sidecar assets
/// (poster image, caption tracks), keyed by the media launch id.
pub fn studio_media_dir(offline_root: &Path, media_id: &str) -> PathBuf {
    offline_root
        .join("StudioVideos")
        .join(clean_filename(media_id))
}

/// Clean a filename by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Pick a video filename extension from a MIME type.
pub fn video_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "application/x-mpegURL" | "application/vnd.apple.mpegurl" => "m3u8",
        _ => "mp4",
    }
}
