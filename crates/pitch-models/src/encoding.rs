//! Encoding settings for the rendered views.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// H.264 encoder used for every view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// Software x264
    #[default]
    Libx264,
    /// NVIDIA hardware encoder
    H264Nvenc,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::H264Nvenc => "h264_nvenc",
        }
    }

    /// Constant-quality flag: x264 takes `-crf`, NVENC `-cq`.
    fn quality_flag(&self) -> &'static str {
        match self {
            Self::Libx264 => "-crf",
            Self::H264Nvenc => "-cq",
        }
    }
}

/// Encoder settings shared by the main, circle, Voronoi and line views.
///
/// Missing fields deserialize to the defaults: libx264, `veryfast`,
/// quality 20, yuv420p in MP4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    pub codec: VideoCodec,

    /// Speed/size trade-off (x264: ultrafast..veryslow, NVENC: p1..p7 or legacy names)
    pub preset: String,

    /// Constant quality, 0-51, lower is better
    pub crf: u8,

    /// Output pixel format; yuv420p keeps the files browser-playable
    pub pixel_format: String,

    /// Container, also used as the output file extension
    pub container: String,

    /// Keyframe interval in frames; `None` leaves the encoder default
    pub keyframe_interval: Option<u32>,

    /// Appended verbatim after the generated arguments
    pub extra_args: Vec<String>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: VideoCodec::Libx264,
            preset: "veryfast".to_string(),
            crf: 20,
            pixel_format: "yuv420p".to_string(),
            container: "mp4".to_string(),
            keyframe_interval: None,
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Switch to the NVENC hardware encoder.
    pub fn with_nvenc(mut self) -> Self {
        self.codec = VideoCodec::H264Nvenc;
        self
    }

    pub fn uses_nvenc(&self) -> bool {
        self.codec == VideoCodec::H264Nvenc
    }

    /// Chroma-subsampled formats that need even frame dimensions.
    pub fn needs_even_dimensions(&self) -> bool {
        matches!(self.pixel_format.as_str(), "yuv420p" | "yuvj420p" | "nv12" | "yuv422p")
    }

    /// Output arguments for frames of `width`×`height`.
    ///
    /// Odd sizes are padded by one pixel when the pixel format needs even
    /// dimensions, which x264 and NVENC reject otherwise.
    pub fn to_ffmpeg_args_for_size(&self, width: u32, height: u32) -> Vec<String> {
        let mut args = Vec::new();
        if self.needs_even_dimensions() && (width % 2 == 1 || height % 2 == 1) {
            args.push("-vf".to_string());
            args.push("pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string());
        }
        args.extend(self.to_ffmpeg_args());
        args
    }

    /// FFmpeg output arguments, placed before the output path.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let crf = self.crf.to_string();
        let mut args: Vec<String> = [
            "-c:v",
            self.codec.ffmpeg_name(),
            "-preset",
            self.preset.as_str(),
            self.codec.quality_flag(),
            crf.as_str(),
            "-pix_fmt",
            self.pixel_format.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(interval) = self.keyframe_interval.filter(|i| *i > 0) {
            args.push("-g".to_string());
            args.push(interval.to_string());
        }

        // Index up front so players can start before the download finishes
        if matches!(self.container.as_str(), "mp4" | "mov") {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_default_args() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-crf", "20"));
        assert!(has_pair(&args, "-pix_fmt", "yuv420p"));
        assert!(has_pair(&args, "-movflags", "+faststart"));
        assert!(!args.contains(&"-g".to_string()));
    }

    #[test]
    fn test_nvenc_uses_cq() {
        let config = EncodingConfig::default().with_nvenc().with_crf(80);
        let args = config.to_ffmpeg_args();

        assert!(config.uses_nvenc());
        assert!(has_pair(&args, "-c:v", "h264_nvenc"));
        assert!(has_pair(&args, "-cq", "51"));
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[test]
    fn test_mkv_with_keyframes_and_extras() {
        let config = EncodingConfig {
            container: "mkv".to_string(),
            keyframe_interval: Some(50),
            extra_args: vec!["-tune".to_string(), "film".to_string()],
            ..EncodingConfig::default()
        };
        let args = config.to_ffmpeg_args();

        assert!(has_pair(&args, "-g", "50"));
        assert!(!args.contains(&"-movflags".to_string()));
        assert_eq!(&args[args.len() - 2..], ["-tune", "film"]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EncodingConfig = serde_json::from_str(r#"{"crf": 28, "codec": "h264_nvenc"}"#).unwrap();
        assert_eq!(config.crf, 28);
        assert_eq!(config.codec, VideoCodec::H264Nvenc);
        assert_eq!(config.preset, "veryfast");
        assert_eq!(config.container, "mp4");
    }

    #[test]
    fn test_odd_sizes_padded_for_420() {
        let config = EncodingConfig::default();

        let odd = config.to_ffmpeg_args_for_size(853, 480);
        assert!(has_pair(&odd, "-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"));
        assert!(has_pair(&config.to_ffmpeg_args_for_size(640, 359), "-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"));
        assert_eq!(config.to_ffmpeg_args_for_size(1050, 680), config.to_ffmpeg_args());

        let full_chroma = EncodingConfig {
            pixel_format: "yuv444p".to_string(),
            ..EncodingConfig::default()
        };
        assert!(!full_chroma.to_ffmpeg_args_for_size(853, 480).contains(&"-vf".to_string()));
    }
}
