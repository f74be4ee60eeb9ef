use std::time::Instant;

use crate::playback::{MediaElement, MediaEvent};

/// Wall-clock playhead: a position anchored at an instant, advancing while playing
#[derive(Default, Debug, Clone)]
pub(crate) struct PlaybackClock {
    pub(crate) playing: bool,
    pub(crate) anchor_instant: Option<Instant>,
    pub(crate) anchor_sec: f64, // position at anchor
}

impl PlaybackClock {
    pub(crate) fn play(&mut self, at: Instant) {
        self.anchor_sec = self.now_at(at);
        self.playing = true;
        self.anchor_instant = Some(at);
    }

    pub(crate) fn pause(&mut self, at: Instant) {
        self.anchor_sec = self.now_at(at);
        self.playing = false;
        self.anchor_instant = None;
    }

    pub(crate) fn now_at(&self, at: Instant) -> f64 {
        match (self.playing, self.anchor_instant) {
            (true, Some(anchor)) => self.anchor_sec + at.saturating_duration_since(anchor).as_secs_f64(),
            _ => self.anchor_sec,
        }
    }

    pub(crate) fn seek_to(&mut self, sec: f64, at: Instant) {
        self.anchor_sec = sec;
        if self.playing {
            self.anchor_instant = Some(at);
        }
    }
}

/// Headless media element driven by the wall clock.
///
/// Stands in for a real decoder: metadata is known up front and reported on
/// load, and the playhead advances in real time while playing. Used by the
/// terminal preview.
#[derive(Debug, Clone)]
pub struct ClockElement {
    duration: f64,
    size: (u32, u32),
    source: Option<String>,
    clock: PlaybackClock,
    volume: f64,
    muted: bool,
    pending: Vec<MediaEvent>,
}

impl ClockElement {
    pub fn new(duration_secs: f64, width: u32, height: u32) -> Self {
        Self {
            duration: duration_secs.max(0.0),
            size: (width, height),
            source: None,
            clock: PlaybackClock::default(),
            volume: 1.0,
            muted: false,
            pending: Vec::new(),
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_playing(&self) -> bool {
        self.clock.playing
    }

    fn position_at(&self, at: Instant) -> f64 {
        self.clock.now_at(at).min(self.duration)
    }

    /// Events as of `at`: a time update while playing, and `Ended` once the
    /// playhead reaches the end.
    pub fn drain_events_at(&mut self, at: Instant) -> Vec<MediaEvent> {
        let mut events = std::mem::take(&mut self.pending);
        if self.clock.playing {
            events.push(MediaEvent::TimeUpdate);
            if self.clock.now_at(at) >= self.duration {
                self.clock.pause(at);
                self.clock.anchor_sec = self.duration;
                events.push(MediaEvent::Ended);
            }
        }
        events
    }

    fn play_at(&mut self, at: Instant) {
        if self.source.is_none() || self.clock.playing {
            return;
        }
        self.clock.play(at);
    }
}

impl MediaElement for ClockElement {
    fn load(&mut self, url: &str) {
        self.source = Some(url.to_string());
        self.clock = PlaybackClock::default();
        self.pending.clear();
        self.pending.push(MediaEvent::LoadedMetadata);
    }

    fn play(&mut self) {
        self.play_at(Instant::now());
    }

    fn pause(&mut self) {
        self.clock.pause(Instant::now());
    }

    fn seek(&mut self, time_secs: f64) {
        let target = time_secs.clamp(0.0, self.duration);
        self.clock.seek_to(target, Instant::now());
        self.pending.push(MediaEvent::TimeUpdate);
    }

    fn set_volume(&mut self, fraction: f64) {
        self.volume = fraction.clamp(0.0, 1.0);
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn current_time(&self) -> f64 {
        self.position_at(Instant::now())
    }

    fn duration(&self) -> Option<f64> {
        (self.source.is_some() && self.duration > 0.0).then_some(self.duration)
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|_| self.size)
    }

    fn drain_events(&mut self) -> Vec<MediaEvent> {
        self.drain_events_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{AspectRatio, PlaybackController, PlaybackPhase};
    use std::time::Duration;

    #[test]
    fn test_clock_advances_only_while_playing() {
        let start = Instant::now();
        let mut clock = PlaybackClock::default();
        assert_eq!(clock.now_at(start), 0.0);

        clock.play(start);
        assert_eq!(clock.now_at(start + Duration::from_secs(2)), 2.0);

        clock.pause(start + Duration::from_secs(3));
        assert_eq!(clock.now_at(start + Duration::from_secs(10)), 3.0);

        clock.seek_to(1.0, start + Duration::from_secs(10));
        clock.play(start + Duration::from_secs(10));
        assert_eq!(clock.now_at(start + Duration::from_secs(11)), 2.0);
    }

    #[test]
    fn test_element_reports_metadata_on_load() {
        let mut element = ClockElement::new(30.0, 1080, 1920);
        assert_eq!(element.duration(), None);
        assert!(element.drain_events().is_empty());

        element.load("/x.mp4");
        assert_eq!(element.duration(), Some(30.0));
        assert_eq!(element.video_size(), Some((1080, 1920)));
        assert_eq!(element.drain_events(), vec![MediaEvent::LoadedMetadata]);
    }

    #[test]
    fn test_element_ends_at_duration() {
        let mut element = ClockElement::new(5.0, 1920, 1080);
        element.load("/x.mp4");
        element.drain_events();

        let start = Instant::now();
        element.play_at(start);
        assert_eq!(
            element.drain_events_at(start + Duration::from_secs(2)),
            vec![MediaEvent::TimeUpdate]
        );
        assert_eq!(
            element.drain_events_at(start + Duration::from_secs(6)),
            vec![MediaEvent::TimeUpdate, MediaEvent::Ended]
        );
        assert!(!element.is_playing());
        assert_eq!(element.position_at(start + Duration::from_secs(60)), 5.0);
    }

    #[test]
    fn test_drives_controller() {
        let mut controller = PlaybackController::new(ClockElement::new(10.0, 1920, 1080));
        controller.bind("/x.mp4");
        assert_eq!(controller.pump(), 1);
        assert_eq!(controller.state().phase, PlaybackPhase::Loaded);
        assert_eq!(controller.state().aspect_ratio, Some(AspectRatio::Landscape));

        controller.set_volume(50.0);
        assert_eq!(controller.element().volume(), 0.5);

        controller.seek(50.0);
        controller.pump();
        assert!((controller.state().progress - 50.0).abs() < 1.0);
        assert!(controller.toggle_play());
        assert!(controller.element().is_playing());
    }
}
