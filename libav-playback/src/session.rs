use std::time::Duration;

use crate::clock::PlaybackClock;
use crate::codec::MediaFrame;
use crate::codec::audio::{self, AudioDecoder, Resampler};
use crate::codec::subtitle::SubtitleDecoder;
use crate::codec::video::{VideoDecoder, VideoSurface};
use crate::error;
use crate::input::InputSource;
use crate::packet::MediaPacket;
use crate::queue::PacketQueue;
use crate::sink::{AudioSink, AudioSpec};
use crate::stream::{TimeBase, Track};
use crate::subtitle::{SubtitleCompositor, SubtitleRasterizer};
use crate::{AUDIO_SPEED_THRESHOLD, MediaType, NO_PTS, PlayerError, Result};

/// Default capacity of the video and audio packet queues.
const DEFAULT_QUEUE_CAPACITY: usize = 128;
/// Container reads performed per `demux_step` call; the cooperative-yield
/// bound that keeps one slow read from starving the driving loop.
const DEMUX_READS_PER_STEP: usize = 16;
/// Seconds of decoded audio the device queue is topped up to each tick.
const AUDIO_BUFFER_TARGET_SECS: f64 = 0.5;
/// Video may trail the master clock by this much before catch-up kicks in.
const SYNC_LAG_THRESHOLD: f64 = 0.040;
/// Upper bound on catch-up frames decoded in a single tick.
const VIDEO_CATCHUP_MAX: usize = 8;
/// Cap on the sleep hint returned when video runs ahead of the clock.
const MAX_SLEEP: Duration = Duration::from_millis(100);
/// Minimal yield between ticks when the engine is keeping pace.
const MIN_YIELD: Duration = Duration::from_millis(1);
/// Poll interval suggested while playback is paused.
const PAUSED_POLL: Duration = Duration::from_millis(50);

/// The builder for creating new [PlaybackSession]s.
pub struct PlaybackSessionBuilder {
    source: InputSource,
    audio_sink: Option<Box<dyn AudioSink>>,
    rasterizer: Option<Box<dyn SubtitleRasterizer>>,
    queue_capacity: usize,
}

impl PlaybackSessionBuilder {
    /// Create a new [PlaybackSessionBuilder] using the given [InputSource]
    /// and safe defaults for all other options.
    pub fn for_source(source: InputSource) -> Self {
        Self {
            source,
            audio_sink: None,
            rasterizer: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Attach the audio output device the session streams PCM into.
    ///
    /// Without a sink the session plays video-only.
    pub fn with_audio_sink(mut self, sink: Box<dyn AudioSink>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    /// Attach the external subtitle rasterizer.
    ///
    /// Without a rasterizer, subtitle tracks are listed but never render.
    pub fn with_subtitle_rasterizer(
        mut self,
        rasterizer: Box<dyn SubtitleRasterizer>,
    ) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Override the capacity of the per-stream packet queues.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity cannot be zero");
        self.queue_capacity = capacity;
        self
    }

    /// Create the [PlaybackSession], opening the video decoder and the
    /// default audio/subtitle tracks.
    pub fn build(self) -> Result<PlaybackSession> {
        let Self {
            source,
            audio_sink,
            rasterizer,
            queue_capacity,
        } = self;

        let video_info = source
            .streams()
            .iter()
            .find(|stream| stream.media_type == MediaType::Video)
            .cloned()
            .ok_or(PlayerError::NoVideoStream)?;

        let audio_tracks: Vec<Track> = source
            .streams()
            .iter()
            .filter(|stream| stream.media_type == MediaType::Audio)
            .map(|stream| Track {
                stream_index: stream.index,
                display_name: stream.display_name("Audio"),
            })
            .collect();
        let subtitle_tracks: Vec<Track> = source
            .streams()
            .iter()
            .filter(|stream| stream.media_type == MediaType::Subtitle)
            .map(|stream| Track {
                stream_index: stream.index,
                display_name: stream.display_name("Subtitles"),
            })
            .collect();

        tracing::info!(
            video = video_info.index,
            audio_tracks = audio_tracks.len(),
            subtitle_tracks = subtitle_tracks.len(),
            "setting up playback session",
        );

        let codec = video_info.codec().ok_or_else(|| {
            PlayerError::from(error::FFmpegError::custom(
                "no decoder available for the video codec",
            ))
        })?;
        let params = source.codec_params(video_info.index).ok_or_else(|| {
            PlayerError::from(error::FFmpegError::custom(
                "missing video codec parameters",
            ))
        })?;
        let video_decoder = VideoDecoder::open(codec, params)?;

        let width = video_decoder.width();
        let height = video_decoder.height();
        let mut compositor = SubtitleCompositor::new(rasterizer);
        compositor.set_frame_size(width, height);

        let mut session = PlaybackSession {
            video_stream_index: video_info.index,
            video_time_base: video_info.time_base,
            video_surface: VideoSurface::new(width, height),
            decode_frame: MediaFrame::new().map_err(PlayerError::from)?,
            input: source,
            video_decoder,
            audio_tracks,
            subtitle_tracks,
            current_audio: None,
            current_subtitle: None,
            audio_decoder: None,
            resampler: None,
            audio_time_base: video_info.time_base,
            sink: audio_sink,
            device_spec: None,
            pcm_buf: Vec::new(),
            subtitle_decoder: None,
            subtitle_time_base: video_info.time_base,
            compositor,
            video_queue: PacketQueue::new(queue_capacity),
            audio_queue: PacketQueue::new(queue_capacity),
            pending: None,
            eof: false,
            clock: PlaybackClock::new(),
            base_time: None,
            video_time: 0.0,
            volume: 1.0,
            paused: false,
        };

        if !session.audio_tracks.is_empty() {
            session.current_audio = Some(0);
            session.open_audio(0);
        }
        if !session.subtitle_tracks.is_empty() {
            session.current_subtitle = Some(0);
            session.open_subtitle(0);
        }
        session.clock.reset(0.0);

        Ok(session)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The outcome of one `demux_step` invocation.
pub enum DemuxStatus {
    /// The full batch of container reads completed with every packet
    /// delivered.
    Progress,
    /// A destination queue is full; the undeliverable packet is held as
    /// pending and no further container reads happen until it is
    /// delivered.
    Blocked,
    /// The container is exhausted.
    EndOfStream,
}

#[derive(Debug, Copy, Clone)]
/// What one [PlaybackSession::advance] tick produced.
pub struct TickOutcome {
    /// Suggested delay before the driving loop's next tick. The engine
    /// never sleeps itself; every entry point stays non-blocking.
    pub sleep: Duration,
    /// `true` once the container is exhausted and every queue has drained.
    pub finished: bool,
}

/// The playback session turns a demultiplexed container into a
/// continuously presented, synchronized stream.
///
/// The session is a state machine driven by a single cooperative loop:
/// the caller repeatedly invokes [PlaybackSession::advance] (or the
/// individual `demux_step` / decode operations) and presents the video
/// and subtitle surfaces each tick. There is no internal thread; every
/// entry point performs bounded work and returns.
pub struct PlaybackSession {
    input: InputSource,

    video_stream_index: usize,
    video_time_base: TimeBase,
    video_decoder: VideoDecoder,
    video_surface: VideoSurface,
    decode_frame: MediaFrame,

    audio_tracks: Vec<Track>,
    subtitle_tracks: Vec<Track>,
    current_audio: Option<usize>,
    current_subtitle: Option<usize>,

    audio_decoder: Option<AudioDecoder>,
    resampler: Option<Resampler>,
    audio_time_base: TimeBase,
    sink: Option<Box<dyn AudioSink>>,
    device_spec: Option<AudioSpec>,
    pcm_buf: Vec<u8>,

    subtitle_decoder: Option<SubtitleDecoder>,
    subtitle_time_base: TimeBase,
    compositor: SubtitleCompositor,

    video_queue: PacketQueue,
    audio_queue: PacketQueue,
    pending: Option<MediaPacket>,
    eof: bool,

    clock: PlaybackClock,
    /// Session-wide normalization offset: the first observed timestamp in
    /// container seconds maps to presentation time zero.
    base_time: Option<f64>,
    /// Last observed video presentation timestamp, normalized.
    video_time: f64,
    volume: f32,
    paused: bool,
}

impl PlaybackSession {
    // ---- demux scheduler ----

    /// Pull up to a bounded number of packets from the container and route
    /// them to their pipelines.
    ///
    /// A packet whose destination queue is full is stashed as pending and
    /// redelivered before any further read; nothing is ever dropped due to
    /// backpressure. Packets on unselected streams are discarded.
    pub fn demux_step(&mut self) -> Result<DemuxStatus> {
        if self.eof {
            return Ok(DemuxStatus::EndOfStream);
        }

        for _ in 0..DEMUX_READS_PER_STEP {
            if let Some(pending) = self.pending.take() {
                if let Some(back) = self.route_packet(pending) {
                    self.pending = Some(back);
                    return Ok(DemuxStatus::Blocked);
                }
            }

            let mut packet = MediaPacket::new().map_err(PlayerError::from)?;
            match self.input.read_into(&mut packet) {
                Ok(()) => {},
                Err(err) if err.is_eof() => {
                    tracing::debug!("end of container stream");
                    self.eof = true;
                    return Ok(DemuxStatus::EndOfStream);
                },
                Err(err) => {
                    tracing::debug!(error = %err, "container read failed, skipping");
                    continue;
                },
            }

            if let Some(back) = self.route_packet(packet) {
                self.pending = Some(back);
                return Ok(DemuxStatus::Blocked);
            }
        }

        Ok(DemuxStatus::Progress)
    }

    /// Route one packet, returning it back if the destination queue is
    /// full.
    fn route_packet(&mut self, packet: MediaPacket) -> Option<MediaPacket> {
        let index = packet.stream_index();

        if index == self.video_stream_index {
            return self.video_queue.push(packet).err();
        }

        if Some(index) == self.active_audio_stream() {
            // With no usable output device, or at trick-play speeds where
            // audio is disabled, queueing would wedge the demuxer once the
            // queue fills without anyone draining it.
            if self.audio_disabled() {
                return None;
            }
            return self.audio_queue.push(packet).err();
        }

        if Some(index) == self.active_subtitle_stream() {
            self.process_subtitle_packet(&packet);
        }

        None
    }

    fn active_audio_stream(&self) -> Option<usize> {
        self.current_audio
            .map(|index| self.audio_tracks[index].stream_index)
    }

    fn active_subtitle_stream(&self) -> Option<usize> {
        self.current_subtitle
            .map(|index| self.subtitle_tracks[index].stream_index)
    }

    fn audio_disabled(&self) -> bool {
        self.device_spec.is_none() || self.clock.speed() > AUDIO_SPEED_THRESHOLD
    }

    // ---- video pipeline ----

    /// Decode packets from the video queue until one frame lands on the
    /// video surface.
    ///
    /// Returns `false` when no frame could be produced (queue empty or the
    /// decoder needs more input) — call [PlaybackSession::demux_step] and
    /// retry.
    pub fn decode_video_once(&mut self) -> Result<bool> {
        loop {
            match self.video_decoder.receive_frame(&mut self.decode_frame) {
                Ok(()) => {
                    if let Err(err) = self
                        .video_decoder
                        .convert_into(&self.decode_frame, &mut self.video_surface)
                    {
                        tracing::debug!(error = %err, "color conversion failed, dropping frame");
                        continue;
                    }

                    let frame = &self.decode_frame;
                    let pts = if frame.best_effort_timestamp != NO_PTS {
                        Some(frame.best_effort_timestamp)
                    } else if frame.pts != NO_PTS {
                        Some(frame.pts)
                    } else {
                        None
                    };
                    if let Some(pts) = pts {
                        let absolute = self.video_time_base.to_seconds(pts);
                        let base = *self.base_time.get_or_insert(absolute);
                        self.video_time = absolute - base;
                    }
                    return Ok(true);
                },
                Err(err) if err.needs_data() => {
                    let Some(packet) = self.video_queue.pop() else {
                        return Ok(false);
                    };
                    if let Err(err) = self.video_decoder.send_packet(&packet) {
                        tracing::debug!(error = %err, "video packet rejected, skipping");
                    }
                },
                Err(err) if err.is_eof() => return Ok(false),
                Err(err) => {
                    tracing::debug!(error = %err, "video decode failed, stalling");
                    return Ok(false);
                },
            }
        }
    }

    // ---- audio pipeline ----

    /// Decode, resample and gain-stage audio until the device holds at
    /// least `target_seconds` of queued PCM or the packet queue drains.
    pub fn decode_audio_until_buffered(&mut self, target_seconds: f64) {
        if self.audio_disabled() {
            return;
        }
        while self.audio_buffer_below(target_seconds) {
            let Some(packet) = self.audio_queue.pop() else {
                return;
            };
            let Some(decoder) = self.audio_decoder.as_mut() else {
                return;
            };
            if let Err(err) = decoder.send_packet(&packet) {
                tracing::debug!(error = %err, "audio packet rejected, skipping");
                continue;
            }

            loop {
                let Some(decoder) = self.audio_decoder.as_mut() else {
                    return;
                };
                match decoder.receive_frame(&mut self.decode_frame) {
                    Ok(()) => self.queue_decoded_audio(),
                    Err(err) if err.needs_data() => break,
                    Err(err) => {
                        tracing::debug!(error = %err, "audio decode failed, skipping frame");
                        break;
                    },
                }
            }
        }
    }

    fn audio_buffer_below(&self, target_seconds: f64) -> bool {
        match (&self.device_spec, self.sink.as_ref(), &self.audio_decoder) {
            (Some(spec), Some(sink), Some(_)) => {
                spec.bytes_to_seconds(sink.queued_bytes()) < target_seconds
            },
            _ => false,
        }
    }

    /// Resample the decoded frame, apply the gain stage and append the
    /// result to the device queue, advancing the audio clock.
    fn queue_decoded_audio(&mut self) {
        let (Some(resampler), Some(sink), Some(spec)) = (
            self.resampler.as_mut(),
            self.sink.as_mut(),
            self.device_spec,
        ) else {
            return;
        };

        let samples = match resampler.convert(&self.decode_frame, &mut self.pcm_buf)
        {
            Ok(samples) => samples,
            Err(err) => {
                tracing::debug!(error = %err, "audio resample failed, dropping frame");
                return;
            },
        };
        if samples == 0 {
            return;
        }

        audio::apply_gain(&mut self.pcm_buf, self.volume);
        sink.queue(&self.pcm_buf);

        let frame = &self.decode_frame;
        let pts = if frame.pts != NO_PTS {
            Some(frame.pts)
        } else if frame.best_effort_timestamp != NO_PTS {
            Some(frame.best_effort_timestamp)
        } else {
            None
        };
        if let Some(pts) = pts {
            let absolute = self.audio_time_base.to_seconds(pts);
            let base = *self.base_time.get_or_insert(absolute);
            let duration = samples as f64 / spec.sample_rate as f64;
            let audio_pts =
                absolute - base + duration - resampler.delay_seconds();
            self.clock.publish_audio_pts(audio_pts);
        }
    }

    fn audio_queued_seconds(&self) -> Option<f64> {
        let spec = self.device_spec?;
        let sink = self.sink.as_ref()?;
        Some(spec.bytes_to_seconds(sink.queued_bytes()))
    }

    // ---- subtitle pipeline ----

    fn process_subtitle_packet(&mut self, packet: &MediaPacket) {
        let Some(decoder) = self.subtitle_decoder.as_mut() else {
            return;
        };
        if !self.compositor.has_track() {
            return;
        }

        match decoder.decode_packet(packet, self.subtitle_time_base) {
            Ok(cues) => {
                let base_ms =
                    (self.base_time.unwrap_or(0.0) * 1000.0).round() as i64;
                for mut cue in cues {
                    cue.start_ms -= base_ms;
                    self.compositor.feed_cue(&cue);
                }
            },
            Err(err) => {
                tracing::debug!(error = %err, "subtitle decode failed, skipping packet");
            },
        }
    }

    /// Render the subtitle cues active at `seconds` onto the RGBA surface.
    ///
    /// Returns `false` (leaving the surface untouched) when no subtitle
    /// track is selected or no cue is active.
    pub fn render_subtitles_at(&mut self, seconds: f64) -> bool {
        let now_ms = (seconds * 1000.0).round() as i64;
        self.compositor.render_at(now_ms)
    }

    // ---- clock / timing ----

    /// The current presentation time in seconds.
    ///
    /// Audio-derived while an audio device is open, a track is selected
    /// and the speed is at or below the trick-play threshold; wall-derived
    /// otherwise. Never decreases except immediately after a seek.
    pub fn current_time(&mut self) -> f64 {
        let audio_master = self.current_audio.is_some()
            && self.clock.speed() <= AUDIO_SPEED_THRESHOLD;
        let queued = if audio_master {
            self.audio_queued_seconds()
        } else {
            None
        };
        self.clock.current(queued)
    }

    /// The last observed video presentation timestamp, normalized so the
    /// first frame of the session is time zero.
    pub fn video_time(&self) -> f64 {
        self.video_time
    }

    /// The container duration in seconds, or `0.0` if unknown.
    pub fn duration(&self) -> f64 {
        self.input.duration_seconds()
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.clock.speed()
    }

    /// Change the playback rate.
    ///
    /// Crossing the audio-disable threshold flushes the device queue so no
    /// stale-rate samples play out; above the threshold audio decoding
    /// stops entirely and the wall clock becomes the master.
    pub fn set_speed(&mut self, speed: f64) {
        if speed <= 0.0 {
            tracing::warn!(speed, "ignoring non-positive playback speed");
            return;
        }
        let previous = self.clock.speed();
        if (previous - speed).abs() < f64::EPSILON {
            return;
        }
        tracing::info!(speed, "changing playback speed");
        self.clock.set_speed(speed);

        let was_disabled = previous > AUDIO_SPEED_THRESHOLD;
        let now_disabled = speed > AUDIO_SPEED_THRESHOLD;
        if was_disabled != now_disabled {
            if let Some(sink) = self.sink.as_mut() {
                sink.clear();
                sink.set_paused(now_disabled || self.paused);
            }
            if now_disabled {
                self.clock.invalidate_audio();
                self.audio_queue.clear();
            }
        }
    }

    /// Set the linear volume gain, clamped to `0.0..=2.0`.
    ///
    /// Queued device audio is flushed so the new gain applies immediately
    /// rather than after the buffered half-second plays out.
    pub fn set_volume(&mut self, gain: f32) {
        self.volume = gain.clamp(0.0, 2.0);
        if let Some(sink) = self.sink.as_mut() {
            sink.clear();
        }
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Pause or resume playback, freezing the presentation clock and the
    /// audio device together.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if paused {
            self.clock.pause();
        } else {
            self.clock.resume();
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.set_paused(
                paused || self.clock.speed() > AUDIO_SPEED_THRESHOLD,
            );
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ---- seek controller ----

    /// Reposition playback at `target_seconds`.
    ///
    /// The container seek is backward-biased, so decoding resumes from the
    /// nearest preceding synchronization point; all decoder state, queues,
    /// the pending packet, queued device audio and the subtitle track are
    /// discarded, and the clock re-anchors at the target.
    pub fn seek(&mut self, target_seconds: f64) -> Result<()> {
        let target = target_seconds.max(0.0);
        tracing::info!(position = target, "seeking playback");

        let container_target = target + self.base_time.unwrap_or(0.0);
        let ts = self.video_time_base.from_seconds(container_target);
        self.input
            .seek_backward(self.video_stream_index, ts)
            .map_err(PlayerError::from)?;

        self.flush_decode_state();
        self.reopen_subtitle_track();
        self.clock.reset(target);
        self.video_time = target;
        self.eof = false;
        Ok(())
    }

    /// Flush every decoder and drop all buffered compressed and PCM data.
    fn flush_decode_state(&mut self) {
        self.video_decoder.flush();
        if let Some(decoder) = self.audio_decoder.as_mut() {
            decoder.flush();
        }
        if let Some(decoder) = self.subtitle_decoder.as_mut() {
            decoder.flush();
        }
        self.video_queue.clear();
        self.audio_queue.clear();
        self.pending = None;
        if let Some(sink) = self.sink.as_mut() {
            sink.clear();
        }
        self.clock.invalidate_audio();
    }

    /// Recreate the rasterizer track so stale cues never survive a seek.
    fn reopen_subtitle_track(&mut self) {
        let Some(current) = self.current_subtitle else {
            return;
        };
        let stream_index = self.subtitle_tracks[current].stream_index;
        let header = self
            .input
            .stream(stream_index)
            .map(|stream| stream.extradata.clone())
            .unwrap_or_default();
        self.compositor.open_track(&header);
    }

    /// Lightweight resync: jump the container back to the current position
    /// without re-anchoring the clock. Used when a newly selected subtitle
    /// stream needs its cues resynthesized from here.
    fn resync_streams(&mut self) -> Result<()> {
        let container_target = self.video_time + self.base_time.unwrap_or(0.0);
        let ts = self.video_time_base.from_seconds(container_target);
        self.input
            .seek_backward(self.video_stream_index, ts)
            .map_err(PlayerError::from)?;
        self.flush_decode_state();
        self.eof = false;
        Ok(())
    }

    // ---- track manager ----

    /// The session's audio track list, in container order.
    pub fn audio_tracks(&self) -> &[Track] {
        &self.audio_tracks
    }

    /// The session's subtitle track list, in container order.
    pub fn subtitle_tracks(&self) -> &[Track] {
        &self.subtitle_tracks
    }

    #[inline]
    pub fn current_audio_track(&self) -> Option<usize> {
        self.current_audio
    }

    #[inline]
    pub fn current_subtitle_track(&self) -> Option<usize> {
        self.current_subtitle
    }

    /// Switch the active audio track.
    ///
    /// The current decode context, resampler and device are closed first;
    /// queued packets from the previous track are discarded so stale data
    /// never reaches the new decoder. An out-of-range index leaves audio
    /// disabled.
    pub fn select_audio_track(&mut self, index: usize) -> Result<()> {
        tracing::info!(index, "selecting audio track");
        self.close_audio();
        if index >= self.audio_tracks.len() {
            tracing::warn!(index, "audio track index out of range, audio disabled");
            return Err(PlayerError::InvalidTrack(index));
        }
        self.current_audio = Some(index);
        self.open_audio(index);
        Ok(())
    }

    /// Switch the active subtitle track; `None` deselects subtitles
    /// entirely (idempotent).
    ///
    /// Selecting a track away from position zero resynchronizes the
    /// container so cues are resynthesized from the current position —
    /// subtitles are never queued, so a restart is the only way to avoid a
    /// gap.
    pub fn select_subtitle_track(&mut self, index: Option<usize>) -> Result<()> {
        tracing::info!(index = ?index, "selecting subtitle track");
        self.close_subtitle();
        let Some(index) = index else {
            return Ok(());
        };
        if index >= self.subtitle_tracks.len() {
            return Err(PlayerError::InvalidTrack(index));
        }
        self.current_subtitle = Some(index);
        self.open_subtitle(index);
        if self.video_time > 0.0 {
            self.resync_streams()?;
        }
        Ok(())
    }

    fn close_audio(&mut self) {
        if let Some(current) = self.current_audio.take() {
            let stream_index = self.audio_tracks[current].stream_index;
            if self.pending.as_ref().map(MediaPacket::stream_index)
                == Some(stream_index)
            {
                self.pending = None;
            }
        }
        self.audio_decoder = None;
        self.resampler = None;
        self.device_spec = None;
        if let Some(sink) = self.sink.as_mut() {
            sink.close();
        }
        self.audio_queue.clear();
        self.clock.invalidate_audio();
    }

    fn open_audio(&mut self, index: usize) {
        let stream_index = self.audio_tracks[index].stream_index;
        let Some(info) = self.input.stream(stream_index).cloned() else {
            return;
        };
        let Some(codec) = info.codec() else {
            tracing::warn!(
                codec = %info.codec_name,
                "no decoder available for audio codec, audio disabled",
            );
            return;
        };
        let Some(params) = self.input.codec_params(stream_index) else {
            return;
        };

        let decoder = match AudioDecoder::open(codec, params) {
            Ok(decoder) => decoder,
            Err(err) => {
                tracing::warn!(error = %err, "failed to open audio decoder, audio disabled");
                return;
            },
        };
        self.audio_time_base = info.time_base;

        if let Some(sink) = self.sink.as_mut() {
            let want = AudioSpec::new(decoder.sample_rate());
            match sink.open(&want) {
                Some(negotiated) => {
                    match Resampler::new(decoder.as_ctx(), negotiated.sample_rate as i32)
                    {
                        Ok(resampler) => {
                            sink.set_paused(
                                self.paused
                                    || self.clock.speed() > AUDIO_SPEED_THRESHOLD,
                            );
                            self.resampler = Some(resampler);
                            self.device_spec = Some(negotiated);
                        },
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to configure resampler");
                            sink.close();
                        },
                    }
                },
                None => {
                    tracing::warn!("audio device failed to open, continuing video-only");
                },
            }
        }

        self.audio_decoder = Some(decoder);
    }

    fn close_subtitle(&mut self) {
        self.current_subtitle = None;
        self.subtitle_decoder = None;
        self.compositor.close_track();
    }

    fn open_subtitle(&mut self, index: usize) {
        let stream_index = self.subtitle_tracks[index].stream_index;
        let Some(info) = self.input.stream(stream_index).cloned() else {
            return;
        };
        let Some(codec) = info.codec() else {
            tracing::warn!(
                codec = %info.codec_name,
                "no decoder available for subtitle codec, subtitles unavailable",
            );
            return;
        };
        let Some(params) = self.input.codec_params(stream_index) else {
            return;
        };

        match SubtitleDecoder::open(codec, params) {
            Ok(decoder) => {
                self.subtitle_time_base = info.time_base;
                if self.compositor.open_track(&info.extradata) {
                    self.subtitle_decoder = Some(decoder);
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to open subtitle decoder, subtitles unavailable");
            },
        }
    }

    // ---- driving loop ----

    /// Run one tick of the playback loop contract.
    ///
    /// Demuxes, tops up audio, decodes video, and paces video against the
    /// master clock: a lagging video pipeline gets a bounded catch-up
    /// burst, a leading one yields a proportional (capped) sleep hint.
    /// Above the trick-play threshold audio is skipped and video free-runs
    /// against the wall clock.
    pub fn advance(&mut self) -> Result<TickOutcome> {
        if self.paused {
            return Ok(TickOutcome {
                sleep: PAUSED_POLL,
                finished: false,
            });
        }

        self.demux_step()?;

        let sleep = if self.clock.speed() <= AUDIO_SPEED_THRESHOLD {
            self.decode_audio_until_buffered(AUDIO_BUFFER_TARGET_SECS);
            self.decode_video_once()?;

            let master = self.current_time();
            let lag = master - self.video_time;
            if lag > SYNC_LAG_THRESHOLD {
                self.catch_up_video(master)?;
                Duration::ZERO
            } else if lag < -SYNC_LAG_THRESHOLD {
                Duration::from_secs_f64((-lag).min(MAX_SLEEP.as_secs_f64()))
            } else {
                MIN_YIELD
            }
        } else {
            let master = self.current_time();
            self.catch_up_video(master)?;
            MIN_YIELD
        };

        let finished = self.eof
            && self.video_queue.is_empty()
            && self.audio_queue.is_empty()
            && self.pending.is_none();

        Ok(TickOutcome { sleep, finished })
    }

    /// Decode up to a bounded number of frames without delay until video
    /// time reaches the master clock.
    fn catch_up_video(&mut self, master: f64) -> Result<()> {
        for _ in 0..VIDEO_CATCHUP_MAX {
            if self.video_time >= master {
                break;
            }
            self.demux_step()?;
            if !self.decode_video_once()? {
                break;
            }
        }
        Ok(())
    }

    // ---- surfaces & state queries ----

    /// The presentable video frame buffer (YUV 4:2:0 planes).
    pub fn video_surface(&self) -> &VideoSurface {
        &self.video_surface
    }

    /// The subtitle compositor, exposing the RGBA overlay surface.
    pub fn subtitles(&self) -> &SubtitleCompositor {
        &self.compositor
    }

    /// `true` once the container has been fully read.
    pub fn end_of_stream(&self) -> bool {
        self.eof
    }

    /// The number of compressed packets buffered for the video pipeline.
    pub fn queued_video_packets(&self) -> usize {
        self.video_queue.len()
    }

    /// The number of compressed packets buffered for the audio pipeline.
    pub fn queued_audio_packets(&self) -> usize {
        self.audio_queue.len()
    }

    /// `true` while the demux scheduler holds an undeliverable packet.
    pub fn has_pending_packet(&self) -> bool {
        self.pending.is_some()
    }
}
