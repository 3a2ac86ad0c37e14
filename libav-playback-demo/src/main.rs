use libav_playback::{
    AudioSink,
    AudioSpec,
    InputSource,
    PlaybackSessionBuilder,
};

/// A stand-in output device that drains its queue against wall time, so
/// the demo paces itself the way a real device would.
struct DrainingSink {
    spec: Option<AudioSpec>,
    queued: usize,
    last_drain: std::time::Instant,
    paused: bool,
}

impl DrainingSink {
    fn new() -> Self {
        Self {
            spec: None,
            queued: 0,
            last_drain: std::time::Instant::now(),
            paused: false,
        }
    }

    fn drain(&mut self) {
        let elapsed = self.last_drain.elapsed();
        self.last_drain = std::time::Instant::now();
        if self.paused {
            return;
        }
        if let Some(spec) = self.spec {
            let played = (elapsed.as_secs_f64() * spec.bytes_per_second() as f64) as usize;
            self.queued = self.queued.saturating_sub(played);
        }
    }
}

impl AudioSink for DrainingSink {
    fn open(&mut self, want: &AudioSpec) -> Option<AudioSpec> {
        self.spec = Some(*want);
        self.queued = 0;
        Some(*want)
    }

    fn queued_bytes(&self) -> usize {
        self.queued
    }

    fn queue(&mut self, pcm: &[u8]) {
        self.drain();
        self.queued += pcm.len();
    }

    fn clear(&mut self) {
        self.queued = 0;
    }

    fn set_paused(&mut self, paused: bool) {
        self.drain();
        self.paused = paused;
    }

    fn close(&mut self) {
        self.queued = 0;
        self.spec = None;
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "samples/test.mp4".to_string());
    let source = InputSource::open_file(&path)?;

    let mut session = PlaybackSessionBuilder::for_source(source)
        .with_audio_sink(Box::new(DrainingSink::new()))
        .build()?;

    tracing::info!(
        duration = session.duration(),
        audio_tracks = session.audio_tracks().len(),
        subtitle_tracks = session.subtitle_tracks().len(),
        "session ready",
    );

    let mut last_report = std::time::Instant::now();
    loop {
        let outcome = session.advance()?;
        if outcome.finished {
            break;
        }

        let now = session.current_time();
        session.render_subtitles_at(now);

        if last_report.elapsed().as_secs() >= 1 {
            last_report = std::time::Instant::now();
            let time = session.current_time();
            let video = session.video_time();
            tracing::info!(time, video, "playing");
        }

        if !outcome.sleep.is_zero() {
            std::thread::sleep(outcome.sleep);
        }
    }

    tracing::info!("completed playback");
    Ok(())
}
