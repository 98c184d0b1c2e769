//! Deterministic fallback classification.
//!
//! Used when the classification service is unavailable, answers with
//! something unusable, or is not confident enough. Extracts season and
//! episode numbers from common filename patterns and derives the show title
//! from the show folder name with release noise stripped.

use crate::models::media::{normalize_title, EpisodeGuess, GuessSource};
use regex::Regex;

/// Upper bound for heuristic confidence.
pub const HEURISTIC_CEILING: f32 = 0.4;

/// How an episode number was found; decides the confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternStrength {
    /// Explicit season and episode (`S01E02`, `1x02`, `Season 1 Episode 2`).
    Explicit,
    /// Explicit episode marker (`E02`, `EP02`, `第2集`).
    Marked,
    /// Bare number in brackets or after a dash (`[02]`, `- 02`).
    Bracketed,
    /// Trailing number with no marker.
    Trailing,
}

impl PatternStrength {
    /// Confidence for a guess found with this pattern.
    pub fn confidence(self) -> f32 {
        match self {
            PatternStrength::Explicit => HEURISTIC_CEILING,
            PatternStrength::Marked => 0.35,
            PatternStrength::Bracketed => 0.3,
            PatternStrength::Trailing => 0.2,
        }
    }
}

/// Season/episode numbers found in a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeMatch {
    pub season: Option<u16>,
    pub episode: u16,
    pub strength: PatternStrength,
}

/// Release tokens that never belong to a title.
const NOISE_TOKENS: &[&str] = &[
    "2160p", "1080p", "1080i", "720p", "576p", "480p", "4k", "uhd", "hdr", "hdr10", "dv",
    "x264", "x265", "h264", "h265", "h.264", "h.265", "hevc", "avc", "av1", "10bit", "8bit",
    "hi10p", "aac", "ac3", "eac3", "flac", "dts", "opus", "ddp", "truehd", "bluray", "blu-ray",
    "bdrip", "brrip", "bd", "web", "web-dl", "webdl", "webrip", "hdtv", "dvdrip", "remux",
    "multi", "dual", "audio", "subs", "sub", "complete", "batch", "repack", "proper", "uncensored",
];

fn find<'t>(pattern: &str, text: &'t str) -> Option<regex::Captures<'t>> {
    Regex::new(pattern).ok()?.captures(text)
}

fn parse_num(caps: &regex::Captures<'_>, idx: usize) -> Option<u16> {
    caps.get(idx)?.as_str().parse::<u16>().ok()
}

/// Strip the final extension from a filename.
fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 && filename.len() - idx <= 6 => &filename[..idx],
        _ => filename,
    }
}

/// Replace dot and underscore separators with spaces.
fn spaced(text: &str) -> String {
    text.chars()
        .map(|c| if c == '.' || c == '_' { ' ' } else { c })
        .collect()
}

/// Remove resolution/codec tokens and CRC-like bracket groups.
fn strip_noise(text: &str) -> String {
    let without_crc = Regex::new(r"[\[\(][0-9A-Fa-f]{8}[\]\)]")
        .map(|re| re.replace_all(text, " ").into_owned())
        .unwrap_or_else(|_| text.to_string());

    without_crc
        .split_whitespace()
        .filter(|token| {
            let bare = token
                .trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | '{' | '}'))
                .to_lowercase();
            !NOISE_TOKENS.contains(&bare.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a bare number is more likely a resolution or a year than an episode.
fn looks_like_non_episode(n: u16) -> bool {
    matches!(n, 480 | 576 | 720 | 1080 | 2160) || (1900..=2100).contains(&n)
}

/// Extract season and episode numbers from a filename.
///
/// Patterns are tried from most to least specific. Episode numbers of zero
/// are rejected.
pub fn extract_episode(filename: &str) -> Option<EpisodeMatch> {
    let name = strip_noise(&spaced(strip_extension(filename)));

    // S01E02, S1 E2, s01.e02
    if let Some(caps) = find(r"(?i)\bs(\d{1,2})\s?e(\d{1,4})\b", &name) {
        if let (Some(season), Some(episode)) = (parse_num(&caps, 1), parse_num(&caps, 2)) {
            if episode > 0 {
                return Some(EpisodeMatch {
                    season: Some(season),
                    episode,
                    strength: PatternStrength::Explicit,
                });
            }
        }
    }

    // 1x02
    if let Some(caps) = find(r"(?i)\b(\d{1,2})x(\d{2,3})\b", &name) {
        if let (Some(season), Some(episode)) = (parse_num(&caps, 1), parse_num(&caps, 2)) {
            if episode > 0 {
                return Some(EpisodeMatch {
                    season: Some(season),
                    episode,
                    strength: PatternStrength::Explicit,
                });
            }
        }
    }

    // Season 1 Episode 2
    if let Some(caps) = find(r"(?i)season\s*(\d{1,2}).*?episode\s*(\d{1,4})", &name) {
        if let (Some(season), Some(episode)) = (parse_num(&caps, 1), parse_num(&caps, 2)) {
            if episode > 0 {
                return Some(EpisodeMatch {
                    season: Some(season),
                    episode,
                    strength: PatternStrength::Explicit,
                });
            }
        }
    }

    // 第2集 / 第2话
    if let Some(caps) = find(r"第\s*(\d{1,4})\s*[集话話]", &name) {
        if let Some(episode) = parse_num(&caps, 1).filter(|e| *e > 0) {
            return Some(EpisodeMatch {
                season: None,
                episode,
                strength: PatternStrength::Marked,
            });
        }
    }

    // E02, EP02, Ep 2, Episode 2
    if let Some(caps) = find(r"(?i)\b(?:episode|ep|e)\s?(\d{1,4})(?:v\d)?\b", &name) {
        if let Some(episode) = parse_num(&caps, 1).filter(|e| *e > 0) {
            return Some(EpisodeMatch {
                season: None,
                episode,
                strength: PatternStrength::Marked,
            });
        }
    }

    // [02], (02), 【02】, [02v2]
    if let Ok(re) = Regex::new(r"[\[\(【]\s*(\d{1,4})(?:v\d)?\s*[\]\)】]") {
        for caps in re.captures_iter(&name) {
            if let Some(episode) = parse_num(&caps, 1) {
                if episode > 0 && !looks_like_non_episode(episode) {
                    return Some(EpisodeMatch {
                        season: None,
                        episode,
                        strength: PatternStrength::Bracketed,
                    });
                }
            }
        }
    }

    // "Show - 02"
    if let Some(caps) = find(r"\s-\s*(\d{1,4})(?:v\d)?\b", &name) {
        if let Some(episode) = parse_num(&caps, 1) {
            if episode > 0 && !looks_like_non_episode(episode) {
                return Some(EpisodeMatch {
                    season: None,
                    episode,
                    strength: PatternStrength::Bracketed,
                });
            }
        }
    }

    // Trailing number once bracket groups are gone: "Show 02"
    let unbracketed = Regex::new(r"[\[\(【][^\]\)】]*[\]\)】]")
        .map(|re| re.replace_all(&name, " ").into_owned())
        .unwrap_or_else(|_| name.clone());
    if let Some(caps) = find(r"(?:^|\s)(\d{1,3})(?:v\d)?\s*$", unbracketed.trim_end()) {
        if let Some(episode) = parse_num(&caps, 1) {
            if episode > 0 && !looks_like_non_episode(episode) {
                return Some(EpisodeMatch {
                    season: None,
                    episode,
                    strength: PatternStrength::Trailing,
                });
            }
        }
    }

    None
}

/// Episode range of a multi-episode file (`S01E01-E02`, `S01E01E02`).
///
/// Only ranges of up to ten episodes count; anything wider is treated as
/// noise.
pub fn episode_range(filename: &str) -> Option<(u16, u16)> {
    let name = spaced(strip_extension(filename));
    let caps = find(r"(?i)\bs\d{1,2}\s?e(\d{1,4})(?:-e?|e)(\d{1,4})\b", &name)?;
    let (first, last) = (parse_num(&caps, 1)?, parse_num(&caps, 2)?);
    (first > 0 && last > first && last - first < 10).then_some((first, last))
}

/// Season number stated in a folder name (`Show Season 2`, `Show S2`, `第2季`).
pub fn season_from_folder(folder: &str) -> Option<u16> {
    let name = spaced(folder);
    let patterns = [
        r"(?i)\bseason\s*(\d{1,2})\b",
        r"(?i)\bs(\d{1,2})\b",
        r"第\s*(\d{1,2})\s*季",
    ];
    patterns
        .iter()
        .find_map(|p| find(p, &name).and_then(|caps| parse_num(&caps, 1)))
        .filter(|s| *s > 0)
}

/// Four-digit year in a folder name.
pub fn year_from_folder(folder: &str) -> Option<u16> {
    let caps = find(r"(?:^|[^0-9])((?:19|20)\d{2})(?:[^0-9]|$)", folder)?;
    parse_num(&caps, 1)
}

/// Derive a clean show title from a show folder name.
///
/// Drops release-group brackets, years, season markers and release noise.
pub fn derive_title(folder: &str) -> Option<String> {
    let mut name = spaced(folder);

    let removals = [
        r"[\[【][^\]】]*[\]】]",          // [Group], 【字幕组】
        r"\((?:19|20)\d{2}\)",              // (2023)
        r"\([^)]*\)",                       // other parenthesised notes
        r"(?i)\bseason\s*\d{1,2}\b",
        r"(?i)\bs\d{1,2}\b",
        r"第\s*\d{1,2}\s*季",
        r"(?:^|\s)(?:19|20)\d{2}(?:\s|$)",
    ];
    for pattern in removals {
        if let Ok(re) = Regex::new(pattern) {
            name = re.replace_all(&name, " ").into_owned();
        }
    }

    let cleaned = strip_noise(&name);
    let cleaned = cleaned.trim_matches(|c: char| c == '-' || c.is_whitespace());
    normalize_title(cleaned)
}

/// Title taken from the part of a filename before its episode marker.
fn title_from_filename(filename: &str) -> Option<String> {
    let name = strip_noise(&spaced(strip_extension(filename)));
    let without_groups = Regex::new(r"^\s*[\[【][^\]】]*[\]】]")
        .map(|re| re.replace(&name, " ").into_owned())
        .unwrap_or(name);
    let caps = find(
        r"(?i)^(.+?)\s*(?:-\s*)?(?:\bs\d{1,2}\s?e\d|\b\d{1,2}x\d{2}|\bep?\s?\d|[\[\(【]\s*\d|第|\s\d{1,3}\b)",
        &without_groups,
    )?;
    normalize_title(caps.get(1)?.as_str().trim_matches(|c: char| c == '-' || c.is_whitespace()))
}

/// Build a fallback guess for one file of a show folder.
///
/// `relative` is the file's path inside the show folder (`Season 2/03.mkv`
/// or just the filename). Sub-directory names are consulted for the season
/// before the show folder name. Returns `None` when no episode number can be
/// found.
pub fn guess(relative: &str, show_folder: &str) -> Option<EpisodeGuess> {
    let mut parts: Vec<&str> = relative.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    let filename = parts.pop()?;
    let found = extract_episode(filename)?;

    let title = derive_title(show_folder)
        .or_else(|| title_from_filename(filename))
        .or_else(|| normalize_title(show_folder))?;

    let season = found
        .season
        .or_else(|| parts.iter().rev().find_map(|dir| season_from_folder(dir)))
        .or_else(|| season_from_folder(show_folder))
        .unwrap_or(1);

    Some(EpisodeGuess {
        title,
        year: year_from_folder(show_folder),
        season,
        episode: found.episode,
        confidence: found.strength.confidence(),
        source: GuessSource::Heuristic,
    })
}
