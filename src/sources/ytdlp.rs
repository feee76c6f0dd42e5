use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{is_url, ResolveError, ResolvedTrack, Resolution, TrackResolver};

/// Resolver backed by the `yt-dlp` executable.
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
    max_playlist_size: usize,
}

/// Subset of `yt-dlp --dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    /// Direct media URL for a single video; the page URL for flat entries.
    url: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, timeout: Duration, max_playlist_size: usize) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            max_playlist_size,
        }
    }

    fn args(&self, target: &str, allow_playlist: bool) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--skip-download",
            "--no-warnings",
            "--quiet",
            "-f",
            "bestaudio/best",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        if allow_playlist && is_url(target) {
            args.extend([
                "--flat-playlist".to_string(),
                "--yes-playlist".to_string(),
                "--playlist-end".to_string(),
                self.max_playlist_size.to_string(),
            ]);
        } else {
            args.push("--no-playlist".to_string());
        }

        args.push(target.to_string());
        args
    }

    async fn run(&self, target: &str, allow_playlist: bool) -> Result<String, ResolveError> {
        let mut command = Command::new(&self.binary);
        command.args(self.args(target, allow_playlist)).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))?
            .map_err(|e| ResolveError::Extraction(format!("could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Extraction(first_error_line(&stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Checks that the binary is installed and runnable.
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.binary, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, allow_playlist: bool) -> Result<Resolution, ResolveError> {
        let query = query.trim();
        let searching = !is_url(query);
        let target = if searching {
            format!("ytsearch1:{}", query)
        } else {
            query.to_string()
        };

        info!("🔍 Resolving {}", target);
        let stdout = self.run(&target, allow_playlist).await?;
        let resolution = parse_output(&stdout, query, searching)?;
        debug!("✅ Resolved {} into {} track(s)", query, resolution.len());
        Ok(resolution)
    }
}

/// Interprets one `--dump-single-json` document.
///
/// A search answer is a playlist of results whose first entry is taken as a
/// single track. A real playlist keeps every entry that has a URL.
fn parse_output(stdout: &str, query: &str, searching: bool) -> Result<Resolution, ResolveError> {
    let info: YtDlpInfo = serde_json::from_str(stdout.trim())
        .map_err(|e| ResolveError::Extraction(format!("unreadable yt-dlp output: {}", e)))?;

    match info.entries {
        Some(entries) if searching => entries
            .into_iter()
            .flatten()
            .find_map(single_track)
            .map(Resolution::Single)
            .ok_or_else(|| ResolveError::NotFound(query.to_string())),
        Some(entries) => {
            let total = entries.len();
            let tracks: Vec<ResolvedTrack> = entries
                .into_iter()
                .enumerate()
                .filter_map(|(index, entry)| flat_entry(index, entry))
                .collect();
            if tracks.len() < total {
                warn!("⚠️ Skipped {} unusable playlist entries", total - tracks.len());
            }
            if tracks.is_empty() {
                return Err(ResolveError::NotFound(query.to_string()));
            }
            Ok(Resolution::Playlist {
                title: info.title.unwrap_or_else(|| "Unknown Playlist".to_string()),
                tracks,
            })
        }
        None => {
            let single = YtDlpInfo { entries: None, ..info };
            single_track(single)
                .map(Resolution::Single)
                .ok_or_else(|| ResolveError::NotFound(query.to_string()))
        }
    }
}

fn single_track(info: YtDlpInfo) -> Option<ResolvedTrack> {
    let page_url = info.webpage_url?;
    Some(ResolvedTrack {
        title: info.title.unwrap_or_else(|| "Unknown Title".to_string()),
        page_url,
        duration: info
            .duration
            .filter(|d| *d > 0.0)
            .and_then(|d| Duration::try_from_secs_f64(d).ok()),
        direct_url: info.url.filter(|url| !url.is_empty()),
    })
}

/// Flat playlist entries only carry a page URL; duration is deferred to play time.
fn flat_entry(index: usize, entry: Option<YtDlpInfo>) -> Option<ResolvedTrack> {
    let entry = entry?;
    let page_url = entry.url.or(entry.webpage_url)?;
    Some(ResolvedTrack {
        title: entry
            .title
            .unwrap_or_else(|| format!("Song {} (Fetching...)", index + 1)),
        page_url,
        duration: None,
        direct_url: None,
    })
}

fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR"))
        .or_else(|| stderr.lines().map(str::trim).find(|line| !line.is_empty()))
        .unwrap_or("yt-dlp exited with an error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VIDEO: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "url": "https://rr1---sn.googlevideo.com/videoplayback?expire=1",
        "duration": 212.0
    }"#;

    #[test]
    fn parses_single_video() {
        let resolution = parse_output(VIDEO, "https://youtu.be/dQw4w9WgXcQ", false).unwrap();
        assert_eq!(
            resolution,
            Resolution::Single(ResolvedTrack {
                title: "Never Gonna Give You Up".to_string(),
                page_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
                duration: Some(Duration::from_secs(212)),
                direct_url: Some("https://rr1---sn.googlevideo.com/videoplayback?expire=1".to_string()),
            })
        );
    }

    #[test]
    fn absurd_duration_is_treated_as_unknown() {
        let json = VIDEO.replace("212.0", "1e300");
        let Resolution::Single(track) = parse_output(&json, "https://youtu.be/dQw4w9WgXcQ", false).unwrap() else {
            panic!("expected single track");
        };
        assert_eq!(track.duration, None);
    }

    #[test]
    fn search_takes_first_result() {
        let json = format!(r#"{{"_type": "playlist", "title": "rick", "entries": [null, {VIDEO}]}}"#);
        let resolution = parse_output(&json, "rick", true).unwrap();
        match resolution {
            Resolution::Single(track) => assert_eq!(track.title, "Never Gonna Give You Up"),
            other => panic!("expected single track, got {:?}", other),
        }
    }

    #[test]
    fn empty_search_is_not_found() {
        let err = parse_output(r#"{"title": "x", "entries": []}"#, "nothing", true).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(q) if q == "nothing"));
    }

    #[test]
    fn playlist_entries_are_flat() {
        let json = r#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"_type": "url", "url": "https://www.youtube.com/watch?v=a", "title": "A", "duration": 100},
                null,
                {"_type": "url", "title": "no url"},
                {"_type": "url", "url": "https://www.youtube.com/watch?v=c"}
            ]
        }"#;
        let resolution = parse_output(json, "https://www.youtube.com/playlist?list=x", false).unwrap();
        let Resolution::Playlist { title, tracks } = resolution else {
            panic!("expected playlist");
        };
        assert_eq!(title, "Mix");
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "A");
        assert_eq!(tracks[0].duration, None);
        assert_eq!(tracks[0].direct_url, None);
        assert_eq!(tracks[1].title, "Song 4 (Fetching...)");
    }

    #[test]
    fn playlist_without_usable_entries_is_not_found() {
        let json = r#"{"title": "Empty", "entries": [null, {"title": "x"}]}"#;
        assert!(matches!(parse_output(json, "u", false), Err(ResolveError::NotFound(_))));
    }

    #[test]
    fn garbage_is_extraction_error() {
        assert!(matches!(parse_output("not json", "u", false), Err(ResolveError::Extraction(_))));
    }

    #[test]
    fn args_switch_on_playlist_mode() {
        let resolver = YtDlpResolver::new("yt-dlp", Duration::from_secs(180), 50);

        let playlist = resolver.args("https://www.youtube.com/playlist?list=x", true);
        assert!(playlist.contains(&"--flat-playlist".to_string()));
        assert!(playlist.contains(&"50".to_string()));

        let search = resolver.args("ytsearch1:rick", true);
        assert!(search.contains(&"--no-playlist".to_string()));
        assert_eq!(search.last().map(String::as_str), Some("ytsearch1:rick"));
    }

    #[test]
    fn error_line_prefers_yt_dlp_errors() {
        let stderr = "WARNING: something\nERROR: [youtube] x: Private video\n";
        assert_eq!(first_error_line(stderr), "ERROR: [youtube] x: Private video");
        assert_eq!(first_error_line(""), "yt-dlp exited with an error");
    }
}
