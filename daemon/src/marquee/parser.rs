//! Event block extraction and banner path resolution.
//!
//! The game rewrites its marquee log with one block of `Key: Value` lines per
//! selection event. Only `Event` and `Banner` matter; everything else is
//! ignored, and keys are found by line pattern rather than a full grammar so
//! that prefixes such as timestamps do not break matching.
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// The event type that carries a banner to show.
pub const CHOSEN_EVENT: &str = "Chosen";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarqueeEvent {
    pub event_type: String,
    /// Resolved, forward-slash banner path. Only set for `Chosen` events.
    pub banner_path: Option<String>,
    pub raw_block: String,
}

impl MarqueeEvent {
    pub fn is_chosen(&self) -> bool {
        self.event_type.eq_ignore_ascii_case(CHOSEN_EVENT)
    }
}

/// Why a non-empty block could not be used yet. The writer may still be
/// midway through the block, so callers retry on the next cycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("event block has no Event line")]
    MissingEvent,
    #[error("'{0}' event block has no Banner line")]
    MissingBanner(String),
}

fn event_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)\bEvent[ \t]*:[ \t]*(\S[^\r\n]*?)[ \t\r]*$").expect("valid event regex")
    })
}

fn banner_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)\bBanner[ \t]*:[ \t]*(\S[^\r\n]*?)[ \t\r]*$").expect("valid banner regex")
    })
}

/// Last value of the first capture group of `re` in `content`.
fn last_value(re: &Regex, content: &str) -> Option<String> {
    re.captures_iter(content)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parses the current content of the marquee log.
///
/// Returns `Ok(None)` for an empty (just truncated) file.
pub fn parse_event_block(
    content: &str,
    base_path: Option<&str>,
) -> Result<Option<MarqueeEvent>, ParseError> {
    if content.trim().is_empty() {
        return Ok(None);
    }

    let event_type = last_value(event_re(), content).ok_or(ParseError::MissingEvent)?;
    let mut event = MarqueeEvent {
        event_type,
        banner_path: None,
        raw_block: content.to_string(),
    };

    if event.is_chosen() {
        let banner = last_value(banner_re(), content)
            .ok_or_else(|| ParseError::MissingBanner(event.event_type.clone()))?;
        event.banner_path = Some(resolve_banner_path(&banner, base_path));
    }
    Ok(Some(event))
}

// ── Path resolution ───────────────────────────────────────────────────────────

/// Converts every `\` to `/`.
pub fn normalize_separators(path: &str) -> String {
    path.trim().replace('\\', "/")
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn is_unc(path: &str) -> bool {
    path.starts_with("//")
}

fn is_under(path: &str, base: &str) -> bool {
    let path = path.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    path == base || path.starts_with(&format!("{base}/"))
}

/// Resolves a banner path from the log against the game's install directory.
///
/// Drive-letter paths, UNC paths and paths already inside `base_path` are
/// kept. Anything else, including a path that starts with a separator but
/// has no drive letter, is joined onto `base_path`. The result always uses
/// forward slashes and never contains a doubled separator at the join.
pub fn resolve_banner_path(raw: &str, base_path: Option<&str>) -> String {
    let path = normalize_separators(raw);
    let base = base_path
        .map(normalize_separators)
        .map(|b| b.trim_end_matches('/').to_string())
        .filter(|b| !b.is_empty());

    let Some(base) = base else {
        return path;
    };
    if has_drive_letter(&path) || is_unc(&path) || is_under(&path, &base) {
        return path;
    }
    format!("{base}/{}", path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r"C:\Games\ITGmania";

    // ── resolve_banner_path ───────────────────────────────────────────────────

    #[test]
    fn relative_path_is_joined_to_base() {
        assert_eq!(
            resolve_banner_path("Songs/Pack/Song/banner.png", Some(BASE)),
            "C:/Games/ITGmania/Songs/Pack/Song/banner.png"
        );
    }

    #[test]
    fn separator_prefixed_path_is_joined_without_double_slash() {
        assert_eq!(
            resolve_banner_path(r"\Songs\Pack\Song\banner.png", Some(BASE)),
            "C:/Games/ITGmania/Songs/Pack/Song/banner.png"
        );
        assert_eq!(
            resolve_banner_path("/Songs/Pack/banner.png", Some("C:/Games/ITGmania/")),
            "C:/Games/ITGmania/Songs/Pack/banner.png"
        );
    }

    #[test]
    fn drive_letter_path_is_kept() {
        assert_eq!(
            resolve_banner_path(r"D:\Banners\pack.png", Some(BASE)),
            "D:/Banners/pack.png"
        );
    }

    #[test]
    fn unc_path_is_kept() {
        assert_eq!(
            resolve_banner_path(r"\\nas\songs\banner.png", Some(BASE)),
            "//nas/songs/banner.png"
        );
    }

    #[test]
    fn path_already_under_base_is_kept() {
        assert_eq!(
            resolve_banner_path("/srv/itg/Songs/banner.png", Some("/srv/itg")),
            "/srv/itg/Songs/banner.png"
        );
    }

    #[test]
    fn no_base_only_normalizes() {
        assert_eq!(
            resolve_banner_path(r"Songs\banner.png", None),
            "Songs/banner.png"
        );
        assert_eq!(resolve_banner_path("Songs/banner.png", Some("  ")), "Songs/banner.png");
    }

    // ── parse_event_block ─────────────────────────────────────────────────────

    #[test]
    fn chosen_event_with_windows_banner() {
        let block = "Event: Chosen\r\nBanner: C:\\Games\\ITGmania\\Songs\\Pack\\Song\\banner.png\r\nTitle: Song\r\n";
        let event = parse_event_block(block, Some(BASE)).unwrap().unwrap();
        assert_eq!(event.event_type, "Chosen");
        assert!(event.is_chosen());
        assert_eq!(
            event.banner_path.as_deref(),
            Some("C:/Games/ITGmania/Songs/Pack/Song/banner.png")
        );
        assert_eq!(event.raw_block, block);
    }

    #[test]
    fn tolerates_surrounding_text_and_spacing() {
        let block = "[12:00:01] Event :   Chosen  \n[12:00:01] Banner:Songs/Pack/bn.png\n";
        let event = parse_event_block(block, Some(BASE)).unwrap().unwrap();
        assert_eq!(event.event_type, "Chosen");
        assert_eq!(
            event.banner_path.as_deref(),
            Some("C:/Games/ITGmania/Songs/Pack/bn.png")
        );
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let block = "Artist: Someone\nEvent: Chosen\nSubtitle: x\nBanner: a.png\nBPM: 140\n";
        let event = parse_event_block(block, None).unwrap().unwrap();
        assert_eq!(event.banner_path.as_deref(), Some("a.png"));
    }

    #[test]
    fn non_chosen_event_has_no_banner() {
        let block = "Event: Idle\nBanner: ignored.png\n";
        let event = parse_event_block(block, Some(BASE)).unwrap().unwrap();
        assert_eq!(event.event_type, "Idle");
        assert!(!event.is_chosen());
        assert!(event.banner_path.is_none());
    }

    #[test]
    fn empty_content_is_no_event() {
        assert_eq!(parse_event_block("", None), Ok(None));
        assert_eq!(parse_event_block("  \r\n\n", None), Ok(None));
    }

    #[test]
    fn block_without_event_is_incomplete() {
        assert_eq!(
            parse_event_block("Banner: a.png\n", None),
            Err(ParseError::MissingEvent)
        );
    }

    #[test]
    fn chosen_without_banner_is_incomplete() {
        assert_eq!(
            parse_event_block("Event: Chosen\n", None),
            Err(ParseError::MissingBanner("Chosen".into()))
        );
    }

    #[test]
    fn empty_banner_value_does_not_swallow_next_line() {
        assert_eq!(
            parse_event_block("Banner:\nEvent: Chosen\n", None),
            Err(ParseError::MissingBanner("Chosen".into()))
        );
    }

    #[test]
    fn subevent_key_is_not_an_event() {
        assert_eq!(
            parse_event_block("SubEvent: Chosen\n", None),
            Err(ParseError::MissingEvent)
        );
    }
}
