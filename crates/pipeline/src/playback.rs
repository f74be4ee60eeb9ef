//! Preview playback control
//!
//! `PlaybackController` owns transport state for one bound media resource and
//! keeps a `MediaElement` in sync with it. The element is owned (or exclusively
//! borrowed) by the controller, so two controllers can never drive the same
//! element.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;
use tracing::{debug, info, trace};

pub const DEFAULT_VOLUME: f64 = 80.0;

/// Capabilities the controller needs from a media playback primitive
pub trait MediaElement {
    /// Start loading a resource; metadata arrives later as `LoadedMetadata`
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, time_secs: f64);
    /// 0.0..=1.0
    fn set_volume(&mut self, fraction: f64);
    fn set_muted(&mut self, muted: bool);
    fn current_time(&self) -> f64;
    /// None until metadata is loaded
    fn duration(&self) -> Option<f64>;
    /// Native (width, height), None until metadata is loaded
    fn video_size(&self) -> Option<(u32, u32)>;

    /// Events produced since the last call. Elements that deliver events
    /// through another channel leave this empty.
    fn drain_events(&mut self) -> Vec<MediaEvent> {
        Vec::new()
    }
}

impl<T: MediaElement + ?Sized> MediaElement for &mut T {
    fn load(&mut self, url: &str) {
        (**self).load(url)
    }
    fn play(&mut self) {
        (**self).play()
    }
    fn pause(&mut self) {
        (**self).pause()
    }
    fn seek(&mut self, time_secs: f64) {
        (**self).seek(time_secs)
    }
    fn set_volume(&mut self, fraction: f64) {
        (**self).set_volume(fraction)
    }
    fn set_muted(&mut self, muted: bool) {
        (**self).set_muted(muted)
    }
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }
    fn duration(&self) -> Option<f64> {
        (**self).duration()
    }
    fn video_size(&self) -> Option<(u32, u32)> {
        (**self).video_size()
    }
    fn drain_events(&mut self) -> Vec<MediaEvent> {
        (**self).drain_events()
    }
}

impl<T: MediaElement + ?Sized> MediaElement for Box<T> {
    fn load(&mut self, url: &str) {
        (**self).load(url)
    }
    fn play(&mut self) {
        (**self).play()
    }
    fn pause(&mut self) {
        (**self).pause()
    }
    fn seek(&mut self, time_secs: f64) {
        (**self).seek(time_secs)
    }
    fn set_volume(&mut self, fraction: f64) {
        (**self).set_volume(fraction)
    }
    fn set_muted(&mut self, muted: bool) {
        (**self).set_muted(muted)
    }
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }
    fn duration(&self) -> Option<f64> {
        (**self).duration()
    }
    fn video_size(&self) -> Option<(u32, u32)> {
        (**self).video_size()
    }
    fn drain_events(&mut self) -> Vec<MediaEvent> {
        (**self).drain_events()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    LoadedMetadata,
    TimeUpdate,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let ratio = width as f64 / height as f64;
        if ratio > 1.0 {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Landscape => write!(f, "16:9"),
            Self::Portrait => write!(f, "9:16"),
        }
    }
}

/// Display label only; does not change the bound resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "1080p")]
    Full,
    #[default]
    #[serde(rename = "720p")]
    High,
    #[serde(rename = "480p")]
    Standard,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "1080p"),
            Self::High => write!(f, "720p"),
            Self::Standard => write!(f, "480p"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1080p" | "1080" => Ok(Self::Full),
            "720p" | "720" => Ok(Self::High),
            "480p" | "480" => Ok(Self::Standard),
            other => Err(format!("unknown quality '{}' (expected 1080p, 720p or 480p)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackPhase {
    #[default]
    Unbound,
    Loaded,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    pub is_playing: bool,
    pub is_muted: bool,
    /// 0..=100
    pub volume: f64,
    /// Percentage of duration elapsed, 0..=100
    pub progress: f64,
    /// Set once, when metadata loads
    pub aspect_ratio: Option<AspectRatio>,
    pub quality: Quality,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Unbound,
            is_playing: false,
            is_muted: false,
            volume: DEFAULT_VOLUME,
            progress: 0.0,
            aspect_ratio: None,
            quality: Quality::default(),
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub struct PlaybackController<E: MediaElement> {
    element: E,
    source: Option<String>,
    state: PlaybackState,
    updates: watch::Sender<PlaybackState>,
}

impl<E: MediaElement> PlaybackController<E> {
    pub fn new(element: E) -> Self {
        let (updates, _) = watch::channel(PlaybackState::default());
        Self {
            element,
            source: None,
            state: PlaybackState::default(),
            updates,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.updates.subscribe()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    /// Release the element
    pub fn into_element(self) -> E {
        self.element
    }

    /// Bind to a new resource, resetting all transport state
    pub fn bind(&mut self, url: impl Into<String>) {
        let url = url.into();
        info!("Binding preview to {}", url);

        self.state = PlaybackState::default();
        self.element.load(&url);
        self.element.set_volume(self.state.volume / 100.0);
        self.element.set_muted(self.state.is_muted);
        self.source = Some(url);
        self.publish();
    }

    /// Returns whether playback is running afterwards
    pub fn toggle_play(&mut self) -> bool {
        match self.state.phase {
            PlaybackPhase::Unbound => {
                debug!("toggle_play ignored, metadata not loaded");
            }
            PlaybackPhase::Loaded | PlaybackPhase::Paused => {
                self.element.play();
                self.set_phase(PlaybackPhase::Playing);
            }
            PlaybackPhase::Playing => {
                self.element.pause();
                self.set_phase(PlaybackPhase::Paused);
            }
            PlaybackPhase::Ended => {
                // Restart from the beginning
                self.element.seek(0.0);
                self.element.play();
                self.state.progress = 0.0;
                self.set_phase(PlaybackPhase::Playing);
            }
        }
        self.publish();
        self.state.is_playing
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = clamp_percent(volume);
        self.state.volume = volume;
        self.element.set_volume(volume / 100.0);
        self.publish();
    }

    /// Returns the new mute flag. Stored volume is untouched.
    pub fn toggle_mute(&mut self) -> bool {
        self.state.is_muted = !self.state.is_muted;
        self.element.set_muted(self.state.is_muted);
        self.publish();
        self.state.is_muted
    }

    /// Jump to a percentage of the duration. No-op until the duration is known.
    pub fn seek(&mut self, percent: f64) {
        let percent = clamp_percent(percent);
        let Some(duration) = self.known_duration() else {
            debug!("seek to {:.1}% ignored, duration unknown", percent);
            return;
        };

        self.element.seek(duration * percent / 100.0);
        self.state.progress = percent;
        if self.state.phase == PlaybackPhase::Ended {
            self.set_phase(PlaybackPhase::Paused);
        }
        self.publish();
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.state.quality = quality;
        self.publish();
    }

    pub fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LoadedMetadata => {
                if self.state.phase != PlaybackPhase::Unbound {
                    trace!("duplicate metadata event ignored");
                    return;
                }
                self.state.aspect_ratio = self
                    .element
                    .video_size()
                    .map(|(w, h)| AspectRatio::from_dimensions(w, h));
                self.state.progress = self.progress_from_element();
                self.set_phase(PlaybackPhase::Loaded);
                debug!(
                    "metadata loaded: duration {:?}, aspect {:?}",
                    self.element.duration(),
                    self.state.aspect_ratio
                );
            }
            MediaEvent::TimeUpdate => {
                if matches!(self.state.phase, PlaybackPhase::Unbound | PlaybackPhase::Ended) {
                    return;
                }
                self.state.progress = self.progress_from_element();
            }
            MediaEvent::Ended => {
                if self.state.phase == PlaybackPhase::Unbound {
                    trace!("end of previous source ignored before metadata");
                    return;
                }
                self.state.progress = 100.0;
                self.set_phase(PlaybackPhase::Ended);
            }
        }
        self.publish();
    }

    /// Process events queued by the element. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let events = self.element.drain_events();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        count
    }

    fn element_duration(&self) -> Option<f64> {
        self.source.as_ref()?;
        self.element
            .duration()
            .filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Seekable duration: requires loaded metadata
    fn known_duration(&self) -> Option<f64> {
        if self.state.phase == PlaybackPhase::Unbound {
            return None;
        }
        self.element_duration()
    }

    fn progress_from_element(&self) -> f64 {
        match self.known_duration() {
            Some(duration) => clamp_percent(self.element.current_time() / duration * 100.0),
            None => 0.0,
        }
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        self.state.phase = phase;
        self.state.is_playing = phase == PlaybackPhase::Playing;
    }

    fn publish(&self) {
        self.updates.send_replace(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct FakeElement {
        loaded: Vec<String>,
        playing: bool,
        muted: bool,
        volume: f64,
        time: f64,
        duration: Option<f64>,
        size: Option<(u32, u32)>,
        seeks: Vec<f64>,
    }

    impl FakeElement {
        fn with_metadata(duration: f64, width: u32, height: u32) -> Self {
            Self {
                duration: Some(duration),
                size: Some((width, height)),
                ..Self::default()
            }
        }
    }

    impl MediaElement for FakeElement {
        fn load(&mut self, url: &str) {
            self.loaded.push(url.to_string());
            self.time = 0.0;
            self.playing = false;
        }
        fn play(&mut self) {
            self.playing = true;
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn seek(&mut self, time_secs: f64) {
            self.time = time_secs;
            self.seeks.push(time_secs);
        }
        fn set_volume(&mut self, fraction: f64) {
            self.volume = fraction;
        }
        fn set_muted(&mut self, muted: bool) {
            self.muted = muted;
        }
        fn current_time(&self) -> f64 {
            self.time
        }
        fn duration(&self) -> Option<f64> {
            self.duration
        }
        fn video_size(&self) -> Option<(u32, u32)> {
            self.size
        }
    }

    fn loaded(duration: f64, width: u32, height: u32) -> PlaybackController<FakeElement> {
        let mut controller = PlaybackController::new(FakeElement::with_metadata(duration, width, height));
        controller.bind("/x.mp4");
        controller.handle_event(MediaEvent::LoadedMetadata);
        controller
    }

    #[test]
    fn test_bind_starts_unbound_with_defaults() {
        let mut controller = PlaybackController::new(FakeElement::default());
        controller.bind("/x.mp4");

        let state = controller.state();
        assert_eq!(state.phase, PlaybackPhase::Unbound);
        assert!(!state.is_playing);
        assert_eq!(state.progress, 0.0);
        assert_eq!(state.aspect_ratio, None);
        assert_eq!(state.volume, DEFAULT_VOLUME);
        assert_eq!(controller.element().loaded, vec!["/x.mp4".to_string()]);
        assert_eq!(controller.element().volume, 0.8);
    }

    #[test]
    fn test_aspect_ratio_from_native_dimensions() {
        let wide = loaded(10.0, 1920, 1080);
        assert_eq!(wide.state().aspect_ratio, Some(AspectRatio::Landscape));
        assert_eq!(wide.state().aspect_ratio.unwrap().to_string(), "16:9");

        let tall = loaded(10.0, 1080, 1920);
        assert_eq!(tall.state().aspect_ratio, Some(AspectRatio::Portrait));
        assert_eq!(tall.state().aspect_ratio.unwrap().to_string(), "9:16");

        assert_eq!(AspectRatio::from_dimensions(1000, 1000), AspectRatio::Portrait);
    }

    #[test]
    fn test_aspect_ratio_computed_once_per_resource() {
        let mut controller = loaded(10.0, 1920, 1080);
        controller.element.size = Some((1080, 1920));
        controller.handle_event(MediaEvent::LoadedMetadata);
        assert_eq!(controller.state().aspect_ratio, Some(AspectRatio::Landscape));

        // A new resource gets a fresh computation
        controller.bind("/tall.mp4");
        assert_eq!(controller.state().aspect_ratio, None);
        controller.handle_event(MediaEvent::LoadedMetadata);
        assert_eq!(controller.state().aspect_ratio, Some(AspectRatio::Portrait));
    }

    #[test]
    fn test_toggle_play_twice_from_paused() {
        let mut controller = loaded(10.0, 1920, 1080);
        controller.toggle_play();
        controller.toggle_play();
        assert_eq!(controller.state().phase, PlaybackPhase::Paused);

        assert!(controller.toggle_play());
        assert_eq!(controller.state().phase, PlaybackPhase::Playing);
        assert!(controller.element().playing);

        assert!(!controller.toggle_play());
        assert_eq!(controller.state().phase, PlaybackPhase::Paused);
        assert!(!controller.element().playing);
    }

    #[test]
    fn test_toggle_play_before_metadata_is_ignored() {
        let mut controller = PlaybackController::new(FakeElement::with_metadata(10.0, 16, 9));
        controller.bind("/x.mp4");
        assert!(!controller.toggle_play());
        assert!(!controller.element().playing);
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut controller = loaded(10.0, 1920, 1080);
        for (input, expected) in [(150.0, 100.0), (-20.0, 0.0), (42.5, 42.5), (f64::NAN, 0.0)] {
            controller.set_volume(input);
            assert_eq!(controller.state().volume, expected);
            assert_eq!(controller.element().volume, expected / 100.0);
        }
    }

    #[test]
    fn test_mute_keeps_volume() {
        let mut controller = loaded(10.0, 1920, 1080);
        controller.set_volume(35.0);
        assert!(controller.toggle_mute());
        assert!(controller.element().muted);
        assert_eq!(controller.state().volume, 35.0);
        assert_eq!(controller.element().volume, 0.35);

        // Volume changes while muted are still applied
        controller.set_volume(60.0);
        assert_eq!(controller.element().volume, 0.6);
        assert!(!controller.toggle_mute());
        assert!(!controller.element().muted);
    }

    #[test]
    fn test_seek_translates_to_time() {
        let mut controller = loaded(120.0, 1920, 1080);
        controller.seek(25.0);
        assert_eq!(controller.element().seeks, vec![30.0]);
        assert_eq!(controller.state().progress, 25.0);

        controller.seek(180.0);
        assert_eq!(controller.element().seeks.last(), Some(&120.0));
        assert_eq!(controller.state().progress, 100.0);
    }

    #[test]
    fn test_seek_without_duration_is_noop() {
        let mut controller = PlaybackController::new(FakeElement::default());
        controller.bind("/x.mp4");
        controller.seek(50.0);
        assert!(controller.element().seeks.is_empty());
        assert_eq!(controller.state().progress, 0.0);

        // Metadata without a usable duration
        controller.handle_event(MediaEvent::LoadedMetadata);
        controller.seek(50.0);
        assert!(controller.element().seeks.is_empty());
    }

    #[test]
    fn test_time_updates_drive_progress() {
        let mut controller = loaded(200.0, 1920, 1080);
        controller.toggle_play();
        controller.element.time = 50.0;
        controller.handle_event(MediaEvent::TimeUpdate);
        assert_eq!(controller.state().progress, 25.0);

        controller.element.time = 150.0;
        controller.handle_event(MediaEvent::TimeUpdate);
        assert_eq!(controller.state().progress, 75.0);
    }

    #[test]
    fn test_progress_stays_zero_without_duration() {
        let mut controller = PlaybackController::new(FakeElement::default());
        controller.bind("/x.mp4");
        controller.element.time = 12.0;
        controller.handle_event(MediaEvent::TimeUpdate);
        assert_eq!(controller.state().progress, 0.0);
    }

    #[test]
    fn test_events_before_metadata_are_ignored() {
        let mut controller = PlaybackController::new(FakeElement::with_metadata(10.0, 1080, 1920));
        controller.bind("/a.mp4");
        controller.element.time = 5.0;

        controller.handle_event(MediaEvent::TimeUpdate);
        assert_eq!(controller.state().phase, PlaybackPhase::Unbound);
        assert_eq!(controller.state().progress, 0.0);

        controller.handle_event(MediaEvent::Ended);
        assert_eq!(controller.state().phase, PlaybackPhase::Unbound);
        assert_eq!(controller.state().progress, 0.0);

        controller.handle_event(MediaEvent::LoadedMetadata);
        let state = controller.state();
        assert_eq!(state.phase, PlaybackPhase::Loaded);
        assert_eq!(state.progress, 0.0);
        assert_eq!(state.aspect_ratio, Some(AspectRatio::Portrait));
    }

    #[test]
    fn test_ended_keeps_full_progress_and_restarts() {
        let mut controller = loaded(10.0, 1920, 1080);
        controller.toggle_play();
        controller.handle_event(MediaEvent::Ended);
        assert_eq!(controller.state().phase, PlaybackPhase::Ended);
        assert!(!controller.state().is_playing);
        assert_eq!(controller.state().progress, 100.0);

        assert!(controller.toggle_play());
        assert_eq!(controller.state().progress, 0.0);
        assert_eq!(controller.element().seeks.last(), Some(&0.0));
    }

    #[test]
    fn test_rebind_resets_state() {
        let mut controller = loaded(10.0, 1920, 1080);
        controller.toggle_play();
        controller.set_volume(10.0);
        controller.toggle_mute();
        controller.set_quality(Quality::Full);
        controller.seek(40.0);

        controller.bind("/next.mp4");
        assert_eq!(controller.state(), &PlaybackState::default());
        assert_eq!(controller.source(), Some("/next.mp4"));
        assert!(!controller.element().muted);
    }

    #[test]
    fn test_subscribers_see_snapshots() {
        let mut controller = loaded(10.0, 1920, 1080);
        let mut updates = controller.subscribe();
        controller.toggle_play();
        assert!(updates.has_changed().unwrap());
        assert!(updates.borrow_and_update().is_playing);
    }

    #[test]
    fn test_exclusive_borrow_of_element() {
        let mut element = FakeElement::with_metadata(10.0, 1920, 1080);
        {
            let mut controller = PlaybackController::new(&mut element);
            controller.bind("/x.mp4");
            controller.handle_event(MediaEvent::LoadedMetadata);
            controller.toggle_play();
        }
        assert!(element.playing);
    }

    #[test]
    fn test_quality_label() {
        assert_eq!("1080p".parse::<Quality>().unwrap(), Quality::Full);
        assert_eq!(Quality::default().to_string(), "720p");
        assert!("4k".parse::<Quality>().is_err());
    }
}
