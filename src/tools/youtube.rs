//! YouTube retrieval backed by yt-dlp.
//!
//! Every call shells out to `yt-dlp` and parses its JSON output. Parsing is
//! kept in free functions so it can be tested without the binary.

use crate::error::{Result, YtAgentError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, instrument};

/// Number of results requested from a YouTube search.
const SEARCH_RESULTS: usize = 10;

/// Maximum entries returned from the trending feed.
const TRENDING_LIMIT: usize = 25;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub video_id: String,
    pub url: String,
}

/// A chapter marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// Video metadata, fetched without downloading the media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub views: Option<u64>,
    pub duration: Option<f64>,
    pub channel: Option<String>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub chapters: Vec<Chapter>,
}

/// An entry of the trending feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingVideo {
    pub title: String,
    pub video_id: String,
    pub url: String,
    pub channel: String,
    pub duration: f64,
    pub view_count: u64,
}

/// An available thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub resolution: String,
}

/// Network-facing YouTube capabilities used by the tools.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait YoutubeProvider: Send + Sync {
    /// Search YouTube for videos matching `query`.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;

    /// Fetch the caption text of a video in `language`.
    async fn transcript(&self, video_id: &str, language: &str) -> Result<String>;

    /// Fetch metadata for a video URL.
    async fn metadata(&self, url: &str) -> Result<VideoMetadata>;

    /// Fetch the trending feed for a two-letter region code.
    async fn trending(&self, region_code: &str) -> Result<Vec<TrendingVideo>>;

    /// List thumbnails for a video URL.
    async fn thumbnails(&self, url: &str) -> Result<Vec<Thumbnail>>;
}

/// yt-dlp backed provider.
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    /// Use a specific yt-dlp executable.
    pub fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    /// Run yt-dlp and return its stdout.
    ///
    /// Dropping the returned future kills the child process.
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {:?}", self.binary, args);

        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    YtAgentError::ToolNotFound(self.binary.clone())
                } else {
                    YtAgentError::tool("yt-dlp", format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(YtAgentError::tool("yt-dlp", stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn video_json(&self, url: &str) -> Result<Value> {
        let stdout = self
            .run(&["--dump-json", "--no-download", "--no-warnings", url])
            .await?;
        Ok(serde_json::from_str(stdout.trim())?)
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl YoutubeProvider for YtDlp {
    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let target = format!("ytsearch{}:{}", SEARCH_RESULTS, query);
        let stdout = self
            .run(&["--dump-json", "--flat-playlist", "--no-warnings", &target])
            .await?;
        Ok(parse_search_results(&stdout))
    }

    #[instrument(skip(self))]
    async fn transcript(&self, video_id: &str, language: &str) -> Result<String> {
        let dir = tempfile::tempdir()?;
        let template = dir.path().join("%(id)s").to_string_lossy().into_owned();
        let url = format!("https://www.youtube.com/watch?v={}", video_id);

        self.run(&[
            "--skip-download",
            "--write-subs",
            "--write-auto-subs",
            "--sub-langs",
            language,
            "--sub-format",
            "json3",
            "--no-warnings",
            "-o",
            &template,
            &url,
        ])
        .await
        .map_err(|e| {
            YtAgentError::tool("fetch_transcript", format!("Failed to fetch transcript: {}", e.tool_message()))
        })?;

        let subtitle = find_subtitle_file(dir.path())?.ok_or_else(|| {
            YtAgentError::tool(
                "fetch_transcript",
                format!(
                    "Failed to fetch transcript: no '{}' captions available for {}",
                    language, video_id
                ),
            )
        })?;

        let raw = tokio::fs::read_to_string(&subtitle).await?;
        let text = parse_json3_transcript(&raw)?;
        if text.is_empty() {
            return Err(YtAgentError::tool(
                "fetch_transcript",
                format!("Failed to fetch transcript: captions for {} are empty", video_id),
            ));
        }
        Ok(text)
    }

    #[instrument(skip(self))]
    async fn metadata(&self, url: &str) -> Result<VideoMetadata> {
        let json = self.video_json(url).await?;
        Ok(parse_metadata(&json))
    }

    #[instrument(skip(self))]
    async fn trending(&self, region_code: &str) -> Result<Vec<TrendingVideo>> {
        let feed = url::Url::parse_with_params(
            "https://www.youtube.com/feed/trending",
            &[("gl", region_code)],
        )
        .map_err(|e| YtAgentError::InvalidInput(e.to_string()))?;
        let limit = TRENDING_LIMIT.to_string();

        let stdout = self
            .run(&[
                "--dump-json",
                "--flat-playlist",
                "--no-warnings",
                "--geo-bypass-country",
                region_code,
                "--playlist-end",
                &limit,
                feed.as_str(),
            ])
            .await?;

        Ok(parse_trending(&stdout))
    }

    #[instrument(skip(self))]
    async fn thumbnails(&self, url: &str) -> Result<Vec<Thumbnail>> {
        let json = self.video_json(url).await?;
        Ok(parse_thumbnails(&json))
    }
}

/// First `.json3` file yt-dlp wrote into `dir`.
fn find_subtitle_file(dir: &Path) -> Result<Option<std::path::PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json3") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Parse `--dump-json --flat-playlist` output of a search (one JSON object per line).
pub fn parse_search_results(stdout: &str) -> Vec<SearchHit> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|json| {
            let video_id = json["id"].as_str()?.to_string();
            Some(SearchHit {
                title: json["title"].as_str().unwrap_or("Unknown Title").to_string(),
                url: format!("https://youtu.be/{}", video_id),
                video_id,
            })
        })
        .collect()
}

/// Extract metadata fields from a `--dump-json` document.
pub fn parse_metadata(json: &Value) -> VideoMetadata {
    let chapters = json["chapters"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|c| Chapter {
                    title: c["title"].as_str().unwrap_or_default().to_string(),
                    start_time: c["start_time"].as_f64().unwrap_or_default(),
                    end_time: c["end_time"].as_f64().unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    VideoMetadata {
        title: json["title"].as_str().map(str::to_string),
        views: json["view_count"].as_u64(),
        duration: json["duration"].as_f64(),
        channel: json["uploader"]
            .as_str()
            .or_else(|| json["channel"].as_str())
            .map(str::to_string),
        likes: json["like_count"].as_u64(),
        comments: json["comment_count"].as_u64(),
        chapters,
    }
}

/// Parse the flat trending feed, skipping entries without an id or url.
pub fn parse_trending(stdout: &str) -> Vec<TrendingVideo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|json| {
            let video_id = json["id"].as_str()?.to_string();
            let url = json["url"].as_str()?.to_string();
            Some(TrendingVideo {
                title: json["title"].as_str().unwrap_or("N/A").to_string(),
                video_id,
                url,
                channel: json["uploader"].as_str().unwrap_or("N/A").to_string(),
                duration: json["duration"].as_f64().unwrap_or_default(),
                view_count: json["view_count"].as_u64().unwrap_or_default(),
            })
        })
        .take(TRENDING_LIMIT)
        .collect()
}

/// Extract thumbnails from a `--dump-json` document.
pub fn parse_thumbnails(json: &Value) -> Vec<Thumbnail> {
    json["thumbnails"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|t| {
                    let url = t["url"].as_str()?.to_string();
                    let width = t["width"].as_u64().map(|w| w as u32);
                    let height = t["height"].as_u64().map(|h| h as u32);
                    let resolution = match (width, height) {
                        (Some(w), Some(h)) => format!("{}x{}", w, h),
                        (Some(w), None) => w.to_string(),
                        (None, Some(h)) => h.to_string(),
                        (None, None) => String::new(),
                    };
                    Some(Thumbnail {
                        url,
                        width,
                        height,
                        resolution,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Join the caption segments of a json3 subtitle file into plain text.
pub fn parse_json3_transcript(raw: &str) -> Result<String> {
    let json: Value = serde_json::from_str(raw)?;

    let words: Vec<String> = json["events"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|event| event["segs"].as_array())
        .flat_map(|segs| segs.iter().filter_map(|s| s["utf8"].as_str()))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect();

    Ok(words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    /// Write an executable shell script standing in for yt-dlp.
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str) -> String {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh\n{}", body).unwrap();
            file.sync_all().unwrap();
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_call_kills_ytdlp() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = fake_ytdlp(dir.path(), &format!("sleep 1\ntouch '{}'", marker.display()));
        let ytdlp = YtDlp::with_binary(&script);

        let outcome = tokio::time::timeout(Duration::from_millis(200), ytdlp.search("rust async")).await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_ytdlp(dir.path(), "echo 'ERROR: Video unavailable' >&2\nexit 1");

        let err = YtDlp::with_binary(&script).metadata("https://youtu.be/dQw4w9WgXcQ").await.unwrap_err();
        assert_eq!(err.tool_message(), "ERROR: Video unavailable");
    }

    #[test]
    fn test_parse_search_results() {
        let stdout = concat!(
            r#"{"id": "dQw4w9WgXcQ", "title": "Never Gonna Give You Up"}"#,
            "\n\n",
            r#"{"title": "no id, skipped"}"#,
            "\n",
            r#"{"id": "abcdefghijk"}"#,
            "\n",
        );

        let hits = parse_search_results(stdout);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Never Gonna Give You Up");
        assert_eq!(hits[0].url, "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(hits[1].title, "Unknown Title");
    }

    #[test]
    fn test_parse_metadata() {
        let json = json!({
            "title": "Talk",
            "view_count": 1200,
            "duration": 615.0,
            "uploader": "Conf",
            "like_count": 40,
            "chapters": [{"title": "Intro", "start_time": 0.0, "end_time": 30.0}]
        });

        let meta = parse_metadata(&json);
        assert_eq!(meta.title.as_deref(), Some("Talk"));
        assert_eq!(meta.views, Some(1200));
        assert_eq!(meta.channel.as_deref(), Some("Conf"));
        assert_eq!(meta.comments, None);
        assert_eq!(meta.chapters.len(), 1);
        assert_eq!(meta.chapters[0].end_time, 30.0);
    }

    #[test]
    fn test_parse_thumbnails() {
        let json = json!({
            "thumbnails": [
                {"url": "https://i.ytimg.com/a.jpg", "width": 120, "height": 90},
                {"url": "https://i.ytimg.com/b.webp"},
                {"width": 10}
            ]
        });

        let thumbs = parse_thumbnails(&json);
        assert_eq!(thumbs.len(), 2);
        assert_eq!(thumbs[0].resolution, "120x90");
        assert_eq!(thumbs[1].resolution, "");
    }

    #[test]
    fn test_parse_trending_skips_incomplete() {
        let stdout = concat!(
            r#"{"id": "a1", "url": "https://www.youtube.com/watch?v=a1", "title": "A", "view_count": 5}"#,
            "\n",
            r#"{"id": "b2"}"#,
        );
        let videos = parse_trending(stdout);
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].channel, "N/A");
        assert_eq!(videos[0].view_count, 5);
    }

    #[test]
    fn test_parse_json3_transcript() {
        let raw = r#"{
            "events": [
                {"tStartMs": 0, "segs": [{"utf8": "never gonna"}, {"utf8": " give"}]},
                {"tStartMs": 500},
                {"tStartMs": 900, "segs": [{"utf8": "\n"}, {"utf8": "you  up"}]}
            ]
        }"#;
        assert_eq!(parse_json3_transcript(raw).unwrap(), "never gonna give you up");
    }
}
