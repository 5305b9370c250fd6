/// Characters that are not allowed in filenames on at least one common platform
const FORBIDDEN_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Strips forbidden characters from a title and trims surrounding whitespace
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Builds a `Content-Disposition` value for an attachment.
///
/// Plain ASCII names go in a quoted `filename`, anything else is percent-encoded
/// into `filename*` so the header stays valid.
pub fn content_disposition(filename: &str) -> String {
    if filename.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!(
            "attachment; filename*=utf-8''{}",
            urlencoding::encode(filename)
        )
    }
}
