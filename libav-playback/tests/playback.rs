//! Media-backed integration tests.
//!
//! These exercise the full demux/decode/sync path and therefore need a real
//! sample file on disk; they are ignored by default and run with
//! `cargo test -- --ignored` once `../media/test.mp4` is present.

use libav_playback::{
    AudioSink,
    AudioSpec,
    DemuxStatus,
    InputSource,
    PlaybackSessionBuilder,
};

const SAMPLE: &str = "../media/test.mp4";

/// A queue-style sink backed by plain memory, draining nothing.
#[derive(Default)]
struct MemorySink {
    queued: Vec<u8>,
}

impl AudioSink for MemorySink {
    fn open(&mut self, want: &AudioSpec) -> Option<AudioSpec> {
        Some(*want)
    }

    fn queued_bytes(&self) -> usize {
        self.queued.len()
    }

    fn queue(&mut self, pcm: &[u8]) {
        self.queued.extend_from_slice(pcm);
    }

    fn clear(&mut self) {
        self.queued.clear();
    }

    fn set_paused(&mut self, _paused: bool) {}

    fn close(&mut self) {
        self.queued.clear();
    }
}

#[test]
#[ignore = "requires sample media at ../media/test.mp4"]
fn session_decodes_frames_and_reports_time() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let source = InputSource::open_file(SAMPLE)?;
    let mut session = PlaybackSessionBuilder::for_source(source)
        .with_audio_sink(Box::new(MemorySink::default()))
        .build()?;

    let mut decoded = 0;
    while decoded < 10 {
        match session.demux_step()? {
            DemuxStatus::EndOfStream => break,
            DemuxStatus::Progress | DemuxStatus::Blocked => {},
        }
        if session.decode_video_once()? {
            decoded += 1;
        }
    }

    assert!(decoded > 0, "no video frames decoded");
    assert!(session.video_surface().width() > 0);
    assert!(session.duration() > 0.0);
    Ok(())
}

#[test]
#[ignore = "requires sample media at ../media/test.mp4"]
fn seek_resets_queues_and_clock() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let source = InputSource::open_file(SAMPLE)?;
    let mut session = PlaybackSessionBuilder::for_source(source)
        .with_audio_sink(Box::new(MemorySink::default()))
        .build()?;

    // Buffer a little of everything first.
    for _ in 0..8 {
        session.demux_step()?;
        session.decode_video_once()?;
    }

    let target = 2.0;
    session.seek(target)?;

    assert_eq!(session.queued_video_packets(), 0);
    assert_eq!(session.queued_audio_packets(), 0);
    assert!(!session.has_pending_packet());
    let reported = session.current_time();
    assert!((reported - target).abs() < 0.1, "time {reported} after seek");
    Ok(())
}

#[test]
#[ignore = "requires sample media at ../media/test.mp4"]
fn audio_track_switch_clears_stale_packets() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let source = InputSource::open_file(SAMPLE)?;
    let mut session = PlaybackSessionBuilder::for_source(source)
        .with_audio_sink(Box::new(MemorySink::default()))
        .build()?;

    if session.audio_tracks().is_empty() {
        return Ok(());
    }

    for _ in 0..8 {
        session.demux_step()?;
    }

    session.select_audio_track(0)?;
    assert_eq!(session.queued_audio_packets(), 0);
    assert_eq!(session.current_audio_track(), Some(0));
    Ok(())
}

#[test]
#[ignore = "requires sample media at ../media/test.mp4"]
fn subtitle_deselect_is_idempotent() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let source = InputSource::open_file(SAMPLE)?;
    let mut session = PlaybackSessionBuilder::for_source(source).build()?;

    session.select_subtitle_track(None)?;
    assert!(!session.render_subtitles_at(1.0));
    session.select_subtitle_track(None)?;
    assert!(!session.render_subtitles_at(1.0));
    assert_eq!(session.current_subtitle_track(), None);
    Ok(())
}
