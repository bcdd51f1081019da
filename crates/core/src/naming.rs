//! Output file naming.
//!
//! The executor's save node writes `{prefix}_{counter:05}_.{ext}` with a
//! counter it picks itself, so the exact name of a finished output is not
//! known up front. We choose a unique prefix per job and later try the
//! names the executor could have produced.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Extensions the save node may emit, most likely first.
pub const OUTPUT_EXTENSIONS: &[&str] = &["png", "jpg", "webp"];

/// Build a unique filename prefix for one job.
///
/// Convention: `atelier_{template}_{YYYYmmdd_HHMMSS}`, with the template
/// name lowercased and anything outside `[a-z0-9_-]` replaced by `_`.
///
/// # Examples
///
/// ```
/// use atelier_core::naming::filename_prefix;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 5).unwrap();
/// assert_eq!(filename_prefix("txt2img", at), "atelier_txt2img_20260301_093005");
/// assert_eq!(filename_prefix("My Flow!", at), "atelier_my_flow__20260301_093005");
/// ```
pub fn filename_prefix(template: &str, at: DateTime<Utc>) -> String {
    let name: String = template
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("atelier_{name}_{}", at.format("%Y%m%d_%H%M%S"))
}

/// Suffix `base` with the first eight hex digits of the session id.
///
/// Without it, two jobs sharing a prefix (a caller-chosen one, or two
/// generated within the same second) would match each other's files.
pub fn session_prefix(base: &str, session_id: Uuid) -> String {
    let token = session_id.simple().to_string();
    format!("{base}_{}", &token[..8])
}

/// One name the save node could have written.
pub fn output_filename(prefix: &str, counter: u32, extension: &str) -> String {
    format!("{prefix}_{counter:05}_.{extension}")
}

/// Every candidate name for counters `1..=max_counter`, counter-major.
pub fn candidate_filenames(prefix: &str, max_counter: u32) -> Vec<String> {
    (1..=max_counter)
        .flat_map(|counter| {
            OUTPUT_EXTENSIONS
                .iter()
                .map(move |ext| output_filename(prefix, counter, ext))
        })
        .collect()
}

/// MIME type from a file extension; unknown extensions are opaque bytes.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_prefix_differs_per_session() {
        let id = Uuid::parse_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap();
        assert_eq!(session_prefix("job", id), "job_1b4e28ba");
        assert_ne!(session_prefix("job", Uuid::new_v4()), session_prefix("job", Uuid::new_v4()));
    }

    #[test]
    fn counter_is_zero_padded() {
        assert_eq!(output_filename("job", 7, "png"), "job_00007_.png");
    }

    #[test]
    fn candidates_cover_every_extension() {
        let names = candidate_filenames("job", 2);
        assert_eq!(
            names,
            vec![
                "job_00001_.png",
                "job_00001_.jpg",
                "job_00001_.webp",
                "job_00002_.png",
                "job_00002_.jpg",
                "job_00002_.webp",
            ]
        );
    }

    #[test]
    fn zero_counters_is_empty() {
        assert!(candidate_filenames("job", 0).is_empty());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a_00001_.png"), "image/png");
        assert_eq!(content_type_for("a.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
