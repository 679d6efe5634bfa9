// FormatSelector - resolves what the host asked for into an engine selector
//
// No merge tool is assumed to be installed, so every preset prefers a single
// pre-muxed mp4 before falling back to separate streams.

/// Used when the host passes nothing or "best"
pub const PREMUXED_BEST: &str = "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best";

pub struct FormatSelector;

impl FormatSelector {
    /// Resolve a host selector. Known presets are expanded, anything else is
    /// handed to the engine verbatim.
    pub fn resolve(selector: Option<&str>) -> String {
        let requested = selector.map(str::trim).filter(|s| !s.is_empty());

        match requested {
            None => PREMUXED_BEST.to_string(),
            Some(s) => match Self::preset(s) {
                Some(expanded) => expanded,
                None => s.to_string(),
            },
        }
    }

    fn preset(name: &str) -> Option<String> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "best" => Some(PREMUXED_BEST.to_string()),
            "audio" => Some("bestaudio[ext=m4a]/bestaudio/best".to_string()),
            "1080p" | "720p" | "480p" | "360p" => {
                let height = lower.trim_end_matches('p');
                Some(Self::height_capped(height))
            }
            _ => None,
        }
    }

    fn height_capped(height: &str) -> String {
        format!(
            "best[height<={h}][ext=mp4]/bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}]/best",
            h = height
        )
    }
}
