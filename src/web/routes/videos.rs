//! Gameplay video listing.

use std::convert::Infallible;
use std::fs;
use std::path::Path;

use hyper::{Body, Response, StatusCode};
use serde::Serialize;

use crate::config::VIDEOS_DIR;
use crate::log_warn;
use crate::web::response_helpers::json_response;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "gif"];

#[derive(Serialize)]
pub struct VideoEntry {
    pub name: String,
    pub file: String,
}

/// `GET /videos`: list recordings with a recognized extension.
pub async fn handle() -> Result<Response<Body>, Infallible> {
    // Create the videos directory if it doesn't exist
    if let Err(e) = fs::create_dir_all(VIDEOS_DIR) {
        log_warn!("[VIDEOS] Failed to create {}: {}", VIDEOS_DIR, e);
    }

    let mut videos = Vec::new();
    match fs::read_dir(VIDEOS_DIR) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() || !is_video_file(&path) {
                    continue;
                }
                if let Some(file) = path.file_name().and_then(|n| n.to_str()) {
                    videos.push(VideoEntry {
                        name: display_name(&path),
                        file: file.to_string(),
                    });
                }
            }
        }
        Err(e) => {
            log_warn!("[VIDEOS] Failed to read {}: {}", VIDEOS_DIR, e);
        }
    }

    // Newest first: recording names embed a timestamp
    videos.sort_by(|a, b| b.file.cmp(&a.file));

    Ok(json_response(StatusCode::OK, &videos))
}

/// Recognized video extension check.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Display name: file stem with underscores as spaces, words title-cased.
pub fn display_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    stem.split('_')
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_recognized_extensions() {
        assert!(is_video_file(&PathBuf::from("cartpole_gameplay.mp4")));
        assert!(is_video_file(&PathBuf::from("run.webm")));
        assert!(is_video_file(&PathBuf::from("run.ogg")));
        assert!(is_video_file(&PathBuf::from("run.gif")));
        assert!(is_video_file(&PathBuf::from("RUN.GIF")));
    }

    #[test]
    fn test_unrecognized_extensions_are_skipped() {
        assert!(!is_video_file(&PathBuf::from("notes.txt")));
        assert!(!is_video_file(&PathBuf::from("model.safetensors")));
        assert!(!is_video_file(&PathBuf::from("noextension")));
    }

    #[test]
    fn test_display_name_title_cases_words() {
        assert_eq!(
            display_name(&PathBuf::from("cartpole_gameplay.gif")),
            "Cartpole Gameplay"
        );
        assert_eq!(
            display_name(&PathBuf::from("donkeykong_gameplay_2024.mp4")),
            "Donkeykong Gameplay 2024"
        );
    }

    #[test]
    fn test_display_name_collapses_repeated_underscores() {
        assert_eq!(display_name(&PathBuf::from("a__b.gif")), "A B");
    }
}
