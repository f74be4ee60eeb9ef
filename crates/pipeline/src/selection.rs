//! User-chosen generation options
//!
//! Pure state holder. Every setter clamps, so a snapshot is always a
//! well-formed `GenerationRequest`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InvalidInput;

pub const SLIDER_MIN: u8 = 0;
pub const SLIDER_MAX: u8 = 100;
pub const SLIDER_DEFAULT: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    /// Lyrics displayed over the visuals
    #[default]
    Lyrics,
    /// Visuals synchronized to the audio
    Music,
}

impl fmt::Display for VideoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lyrics => write!(f, "lyrics"),
            Self::Music => write!(f, "music"),
        }
    }
}

impl FromStr for VideoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lyrics" => Ok(Self::Lyrics),
            "music" => Ok(Self::Music),
            other => Err(format!("unknown video type '{}' (expected lyrics or music)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Youtube,
    Horizontal,
    Vertical,
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Youtube => write!(f, "youtube"),
            Self::Horizontal => write!(f, "horizontal"),
            Self::Vertical => write!(f, "vertical"),
        }
    }
}

impl FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "youtube" => Ok(Self::Youtube),
            "horizontal" => Ok(Self::Horizontal),
            "vertical" => Ok(Self::Vertical),
            other => Err(format!(
                "unknown format '{}' (expected youtube, horizontal or vertical)",
                other
            )),
        }
    }
}

/// Snapshot handed to the generation coordinator. Only `format`,
/// `brightness`, `contrast` and `session_id` go over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(skip)]
    pub video_type: VideoType,
    pub format: VideoFormat,
    pub brightness: u8,
    pub contrast: u8,
    #[serde(skip)]
    pub text_size: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl GenerationRequest {
    /// Build a request from raw values, rejecting out-of-range sliders
    pub fn new(format: VideoFormat, brightness: u8, contrast: u8) -> Result<Self, InvalidInput> {
        let brightness = check_range("brightness", brightness)?;
        let contrast = check_range("contrast", contrast)?;
        Ok(Self {
            video_type: VideoType::default(),
            format,
            brightness,
            contrast,
            text_size: None,
            session_id: None,
        })
    }

    /// Attach the session id returned by the upload
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

fn check_range(name: &'static str, value: u8) -> Result<u8, InvalidInput> {
    if value > SLIDER_MAX {
        return Err(InvalidInput::ParameterOutOfRange {
            name,
            value: value as f64,
        });
    }
    Ok(value)
}

/// Clamp a raw slider value into 0..=100. NaN maps to the minimum.
pub fn clamp_slider(value: f64) -> u8 {
    if value.is_nan() {
        return SLIDER_MIN;
    }
    value.round().clamp(SLIDER_MIN as f64, SLIDER_MAX as f64) as u8
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionModel {
    video_type: VideoType,
    format: VideoFormat,
    brightness: u8,
    contrast: u8,
    text_size: u8,
}

impl Default for SelectionModel {
    fn default() -> Self {
        Self {
            video_type: VideoType::Lyrics,
            format: VideoFormat::Youtube,
            brightness: SLIDER_DEFAULT,
            contrast: SLIDER_DEFAULT,
            text_size: SLIDER_DEFAULT,
        }
    }
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video_type(&self) -> VideoType {
        self.video_type
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn contrast(&self) -> u8 {
        self.contrast
    }

    pub fn text_size(&self) -> u8 {
        self.text_size
    }

    /// Text size only applies to lyrics videos
    pub fn text_size_enabled(&self) -> bool {
        self.video_type == VideoType::Lyrics
    }

    pub fn set_video_type(&mut self, video_type: VideoType) {
        self.video_type = video_type;
    }

    pub fn set_format(&mut self, format: VideoFormat) {
        self.format = format;
    }

    pub fn set_brightness(&mut self, value: f64) {
        self.brightness = clamp_slider(value);
    }

    pub fn set_contrast(&mut self, value: f64) {
        self.contrast = clamp_slider(value);
    }

    pub fn set_text_size(&mut self, value: f64) {
        self.text_size = clamp_slider(value);
    }

    pub fn snapshot(&self) -> GenerationRequest {
        GenerationRequest {
            video_type: self.video_type,
            format: self.format,
            brightness: self.brightness,
            contrast: self.contrast,
            text_size: self.text_size_enabled().then_some(self.text_size),
            session_id: None,
        }
    }
}
