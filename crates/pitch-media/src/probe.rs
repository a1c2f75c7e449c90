//! Stream metadata via `ffprobe`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Rate assumed when the container declares none.
const FALLBACK_FPS: f64 = 30.0;

/// First video stream of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Declared frames, else counted packets, else `duration * fps`
    pub frame_count: u64,
    /// Seconds, 0 when unknown
    pub duration: f64,
    /// Timestamp of the first frame in seconds, the origin of frame slots
    pub start_time: f64,
    pub codec: String,
}

// ffprobe reports most numbers as strings
#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
    start_time: Option<String>,
}

fn number<T: FromStr>(field: &Option<String>) -> Option<T> {
    field.as_deref().and_then(|s| s.trim().parse().ok())
}

impl ProbeReport {
    fn into_video_info(self) -> MediaResult<VideoInfo> {
        let stream = self
            .streams
            .into_iter()
            .find(|s| s.codec_type == "video")
            .ok_or_else(|| MediaError::InvalidVideo("container has no video stream".to_string()))?;

        let duration: f64 = number(&self.format.duration).filter(|d: &f64| d.is_finite()).unwrap_or(0.0);
        let fps = [&stream.avg_frame_rate, &stream.r_frame_rate]
            .into_iter()
            .find_map(|rate| rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(FALLBACK_FPS);

        // MKV and some AVI muxers leave nb_frames out or at 0
        let frame_count = number::<u64>(&stream.nb_frames)
            .filter(|n| *n > 0)
            .or_else(|| number(&stream.nb_read_packets))
            .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);
        let start_time: f64 = number(&stream.start_time).filter(|t: &f64| t.is_finite()).unwrap_or(0.0);

        Ok(VideoInfo {
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            fps,
            frame_count,
            duration,
            start_time,
            codec: stream.codec_name.unwrap_or_default(),
        })
    }
}

/// Probe the first video stream of `path`.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0", "-count_packets"])
        .args(["-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe exited with {}", output.status),
            stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    serde_json::from_slice::<ProbeReport>(&output.stdout)?.into_video_info()
}

/// Frames per second from `"30000/1001"` or `"29.97"`.
///
/// `None` for `0/0`, which ffprobe emits for streams without a rate.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den <= 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => s.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(json: &str) -> ProbeReport {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("12.5"), Some(12.5));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_counted_packets_when_nb_frames_missing() {
        let info = report(
            r#"{
                "streams": [{
                    "codec_type": "video", "codec_name": "h264",
                    "width": 1280, "height": 720,
                    "avg_frame_rate": "25/1", "nb_frames": "0", "nb_read_packets": "250",
                    "start_time": "0.080000"
                }],
                "format": { "duration": "10.0" }
            }"#,
        )
        .into_video_info()
        .unwrap();

        assert_eq!(info.frame_count, 250);
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.codec, "h264");
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.start_time, 0.08);
    }

    #[test]
    fn test_estimate_from_duration_and_r_frame_rate() {
        let info = report(
            r#"{
                "streams": [{ "codec_type": "video", "width": 64, "height": 48,
                              "avg_frame_rate": "0/0", "r_frame_rate": "10/1" }],
                "format": { "duration": "2.0" }
            }"#,
        )
        .into_video_info()
        .unwrap();

        assert_eq!(info.fps, 10.0);
        assert_eq!(info.frame_count, 20);
        assert_eq!(info.start_time, 0.0);
    }

    #[test]
    fn test_audio_only_is_invalid() {
        let result = report(r#"{ "streams": [{ "codec_type": "audio" }] }"#).into_video_info();
        assert!(matches!(result, Err(MediaError::InvalidVideo(_))));
    }
}
