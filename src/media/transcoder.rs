//! FFmpeg-based conversion and probing
//!
//! Shells out to `ffmpeg` for container/codec conversion and to `ffprobe`
//! (JSON output) for duration and stream information. Encoding itself is
//! entirely ffmpeg's business; this module only builds command lines and
//! interprets results.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ConversionSettings;
use crate::error::ConversionError;

/// Codec selection for one conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Video codec (`-c:v`), `None` drops video streams
    pub video_codec: Option<String>,
    /// Audio codec (`-c:a`)
    pub audio_codec: Option<String>,
}

impl ConvertOptions {
    pub fn video(settings: &ConversionSettings) -> Self {
        Self {
            video_codec: Some(settings.video_codec.clone()),
            audio_codec: Some(settings.audio_codec.clone()),
        }
    }

    pub fn music(settings: &ConversionSettings) -> Self {
        Self {
            video_codec: None,
            audio_codec: Some(settings.music_codec.clone()),
        }
    }
}

/// One stream reported by the probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeStream {
    pub index: usize,
    /// "video", "audio", "subtitle", ...
    pub codec_type: String,
    pub codec_name: Option<String>,
}

/// Probe result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub duration_secs: f64,
    pub streams: Vec<ProbeStream>,
}

/// Conversion collaborator used by the Movie, Episode and Music variants
#[async_trait]
pub trait MediaConverter: Send + Sync {
    /// Convert `input` into `output`. The container is chosen from `output`'s extension.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), ConversionError>;

    /// Read duration and streams
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ConversionError>;
}

/// FFprobe JSON output structures
mod ffprobe {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: usize,
        pub codec_name: Option<String>,
        pub codec_type: Option<String>,
        pub duration: Option<String>,
    }
}

/// [`MediaConverter`] backed by the ffmpeg command-line tools
pub struct FfmpegConverter {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegConverter {
    pub fn new(settings: &ConversionSettings) -> Self {
        Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            ffprobe_path: settings.ffprobe_path.clone(),
        }
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), ConversionError> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-y", "-v", "error", "-i"]).arg(input);

        match &options.video_codec {
            Some(codec) => {
                cmd.args(["-map", "0", "-c:v", codec]);
            }
            None => {
                cmd.arg("-vn");
            }
        }
        if let Some(codec) = &options.audio_codec {
            cmd.args(["-c:a", codec]);
        }
        if options.video_codec.is_some() {
            // subtitle codecs rarely survive a container change
            cmd.arg("-sn");
        }

        debug!(
            input = %input.display(),
            output = %output.display(),
            video_codec = ?options.video_codec,
            audio_codec = ?options.audio_codec,
            "Running ffmpeg"
        );

        let result = cmd
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ConversionError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ConversionError::Convert {
                path: input.to_path_buf(),
                message: describe_failure(result.status.code(), stderr.trim()),
            });
        }

        info!(input = %input.display(), output = %output.display(), "Conversion complete");
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<ProbeResult, ConversionError> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .args(["-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await
            .map_err(|source| ConversionError::Spawn {
                program: self.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::Probe {
                path: path.to_path_buf(),
                message: describe_failure(output.status.code(), stderr.trim()),
            });
        }

        let probe: ffprobe::FfprobeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| ConversionError::Probe {
                path: path.to_path_buf(),
                message: format!("invalid ffprobe output: {}", e),
            })?;

        let result = parse_probe_output(probe).ok_or_else(|| ConversionError::Probe {
            path: path.to_path_buf(),
            message: "no duration reported".to_string(),
        })?;

        debug!(
            path = %path.display(),
            duration_secs = result.duration_secs,
            streams = result.streams.len(),
            "Probe complete"
        );

        Ok(result)
    }
}

/// Container duration wins; otherwise the longest stream duration
fn parse_probe_output(probe: ffprobe::FfprobeOutput) -> Option<ProbeResult> {
    let streams = probe.streams.unwrap_or_default();

    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            streams
                .iter()
                .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
                .reduce(f64::max)
        })?;

    Some(ProbeResult {
        duration_secs,
        streams: streams
            .into_iter()
            .map(|s| ProbeStream {
                index: s.index,
                codec_type: s.codec_type.unwrap_or_else(|| "unknown".to_string()),
                codec_name: s.codec_name,
            })
            .collect(),
    })
}

fn describe_failure(code: Option<i32>, stderr: &str) -> String {
    let exit_code = code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "exit code {}: {}",
        exit_code,
        if stderr.is_empty() { "no error output" } else { stderr }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_uses_format_duration() {
        let json = r#"{
            "format": {"duration": "6123.456"},
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264"},
                {"index": 1, "codec_type": "audio", "codec_name": "ac3", "duration": "10.0"}
            ]
        }"#;
        let probe: ffprobe::FfprobeOutput = serde_json::from_str(json).unwrap();
        let result = parse_probe_output(probe).unwrap();
        assert!((result.duration_secs - 6123.456).abs() < 0.001);
        assert_eq!(result.streams.len(), 2);
        assert_eq!(result.streams[1].codec_type, "audio");
    }

    #[test]
    fn test_parse_probe_output_falls_back_to_streams() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "duration": "30.5"},
                {"index": 1, "codec_type": "audio", "duration": "31.0"}
            ]
        }"#;
        let probe: ffprobe::FfprobeOutput = serde_json::from_str(json).unwrap();
        let result = parse_probe_output(probe).unwrap();
        assert!((result.duration_secs - 31.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_probe_output_without_duration() {
        let probe: ffprobe::FfprobeOutput = serde_json::from_str(r#"{"streams": []}"#).unwrap();
        assert!(parse_probe_output(probe).is_none());
    }

    #[test]
    fn test_convert_options() {
        let settings = ConversionSettings::default();
        let video = ConvertOptions::video(&settings);
        assert_eq!(video.video_codec.as_deref(), Some("copy"));
        assert_eq!(video.audio_codec.as_deref(), Some("aac"));

        let music = ConvertOptions::music(&settings);
        assert_eq!(music.video_codec, None);
        assert_eq!(music.audio_codec.as_deref(), Some("libmp3lame"));
    }
}
