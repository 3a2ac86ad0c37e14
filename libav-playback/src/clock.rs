use std::time::{Duration, Instant};

/// The presentation clock arbitrating video pacing.
///
/// Two time sources back the clock: the audio pipeline's published
/// presentation timestamp (minus whatever the device has queued but not yet
/// played) whenever audio is running, and scaled, pausable wall time
/// otherwise. Which source wins is the caller's decision per query — the
/// session only offers an audio reading while a device is open, a track is
/// selected and the playback speed is at or below the trick-play threshold.
///
/// Reported time is clamped to a session high-water mark so it never moves
/// backwards between queries; [PlaybackClock::reset] (seek, track switch)
/// is the only thing that clears the mark.
pub struct PlaybackClock {
    speed: f64,
    anchor: Instant,
    anchor_time: f64,
    pause_accum: Duration,
    pause_started: Option<Instant>,
    audio_pts: f64,
    audio_valid: bool,
    high_water: Option<f64>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            speed: 1.0,
            anchor: Instant::now(),
            anchor_time: 0.0,
            pause_accum: Duration::ZERO,
            pause_started: None,
            audio_pts: 0.0,
            audio_valid: false,
            high_water: None,
        }
    }

    /// Re-anchor the clock at `time` seconds.
    ///
    /// Clears the monotonic high-water mark and invalidates the audio
    /// source; used by seek and track switches. The paused state is kept.
    pub fn reset(&mut self, time: f64) {
        self.re_anchor(time);
        self.audio_valid = false;
        self.high_water = None;
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Change the playback speed without introducing a jump in
    /// wall-derived time.
    pub fn set_speed(&mut self, speed: f64) {
        debug_assert!(speed > 0.0);
        let now = self.wall_time();
        self.re_anchor(now);
        self.speed = speed;
    }

    pub fn pause(&mut self) {
        if self.pause_started.is_none() {
            self.pause_started = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let Some(started) = self.pause_started.take() {
            self.pause_accum += started.elapsed();
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.pause_started.is_some()
    }

    /// Publish the audio pipeline's latest presentation timestamp.
    pub fn publish_audio_pts(&mut self, pts: f64) {
        self.audio_pts = pts;
        self.audio_valid = true;
    }

    /// Mark the audio source unusable until the next published timestamp.
    pub fn invalidate_audio(&mut self) {
        self.audio_valid = false;
    }

    #[inline]
    pub fn audio_valid(&self) -> bool {
        self.audio_valid
    }

    /// The wall-derived time source: real elapsed time scaled by the
    /// playback speed, with paused spans excluded.
    pub fn wall_time(&self) -> f64 {
        let mut elapsed = self.anchor.elapsed();
        elapsed = elapsed.saturating_sub(self.pause_accum);
        if let Some(started) = self.pause_started {
            elapsed = elapsed.saturating_sub(started.elapsed());
        }
        self.anchor_time + self.speed * elapsed.as_secs_f64()
    }

    /// The current presentation time in seconds.
    ///
    /// `audio_queued` is the duration of device-queued but unplayed audio;
    /// passing `Some` selects the audio-derived source when a timestamp has
    /// been published since the last reset.
    pub fn current(&mut self, audio_queued: Option<f64>) -> f64 {
        let raw = match audio_queued {
            Some(queued) if self.audio_valid => (self.audio_pts - queued).max(0.0),
            _ => self.wall_time(),
        };
        let clamped = match self.high_water {
            Some(mark) => raw.max(mark),
            None => raw,
        };
        self.high_water = Some(clamped);
        clamped
    }

    fn re_anchor(&mut self, time: f64) {
        self.anchor = Instant::now();
        self.anchor_time = time;
        self.pause_accum = Duration::ZERO;
        if self.pause_started.is_some() {
            self.pause_started = Some(self.anchor);
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn wall_time_is_monotonic() {
        let mut clock = PlaybackClock::new();
        clock.reset(0.0);
        let mut previous = clock.current(None);
        for _ in 0..200 {
            let now = clock.current(None);
            assert!(now >= previous);
            previous = now;
        }
    }

    #[test]
    fn pause_freezes_reported_time() {
        let mut clock = PlaybackClock::new();
        clock.reset(0.0);
        sleep(Duration::from_millis(5));
        clock.pause();
        let frozen = clock.current(None);
        sleep(Duration::from_millis(20));
        let still_frozen = clock.current(None);
        assert!((still_frozen - frozen).abs() < 1e-6);

        clock.resume();
        sleep(Duration::from_millis(5));
        assert!(clock.current(None) > frozen);
    }

    #[test]
    fn speed_scales_wall_time() {
        let mut clock = PlaybackClock::new();
        clock.reset(0.0);
        clock.set_speed(3.0);

        let started = Instant::now();
        sleep(Duration::from_millis(60));
        let reported = clock.current(None);
        let elapsed = started.elapsed().as_secs_f64();

        // `reported` was sampled before `elapsed`, so it cannot exceed
        // 3x the measured wall time; the sleep guarantees the lower bound.
        assert!(reported >= 3.0 * 0.060 - 1e-3);
        assert!(reported <= 3.0 * elapsed + 1e-3);
    }

    #[test]
    fn speed_change_does_not_jump() {
        let mut clock = PlaybackClock::new();
        clock.reset(0.0);
        sleep(Duration::from_millis(10));
        let before = clock.current(None);
        clock.set_speed(3.0);
        let after = clock.current(None);
        assert!(after >= before);
        assert!(after - before < 0.05);
    }

    #[test]
    fn reset_allows_time_to_move_backwards() {
        let mut clock = PlaybackClock::new();
        clock.reset(10.0);
        assert!(clock.current(None) >= 10.0);

        clock.reset(0.5);
        let reported = clock.current(None);
        assert!(reported >= 0.5);
        assert!(reported < 1.0);
    }

    #[test]
    fn audio_source_wins_when_valid() {
        let mut clock = PlaybackClock::new();
        clock.reset(0.0);
        clock.publish_audio_pts(10.0);
        let reported = clock.current(Some(0.25));
        assert!((reported - 9.75).abs() < 1e-9);

        // A regressed audio reading is clamped by the high-water mark.
        let clamped = clock.current(Some(5.0));
        assert!(clamped >= reported);
    }

    #[test]
    fn audio_source_ignored_until_published() {
        let mut clock = PlaybackClock::new();
        clock.reset(7.0);
        assert!(!clock.audio_valid());
        // Falls back to the wall source near the anchor.
        let reported = clock.current(Some(3.0));
        assert!(reported >= 7.0);
        assert!(reported < 7.5);
    }

    #[test]
    fn invalidate_switches_back_to_wall() {
        let mut clock = PlaybackClock::new();
        clock.reset(20.0);
        clock.publish_audio_pts(20.0);
        let audio_backed = clock.current(Some(0.0));
        assert!((audio_backed - 20.0).abs() < 0.1);

        clock.invalidate_audio();
        let wall_backed = clock.current(Some(0.0));
        assert!(wall_backed >= audio_backed);
    }
}
