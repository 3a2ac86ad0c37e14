use crate::codec::audio::BYTES_PER_FRAME;

/// The parameters of the engine's PCM output stream.
///
/// The sample format is fixed: interleaved signed 16-bit, two channels.
/// Only the rate and the device buffer size are negotiable.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AudioSpec {
    /// Samples per second, per channel.
    pub sample_rate: u32,
    /// Requested device buffer size in sample frames.
    pub buffer_frames: u16,
}

impl AudioSpec {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            buffer_frames: 4096,
        }
    }

    #[inline]
    /// PCM bytes consumed per second of playback at this spec.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * BYTES_PER_FRAME
    }

    #[inline]
    /// Convert a queued byte count into seconds of unplayed audio.
    pub fn bytes_to_seconds(&self, bytes: usize) -> f64 {
        bytes as f64 / self.bytes_per_second() as f64
    }
}

/// The audio output device boundary.
///
/// The engine drives a queue-style device: it appends converted PCM and the
/// device drains it in real time. Implementations live outside this crate
/// (an SDL queued-audio device, a ring buffer over a callback API, a test
/// double); the engine only relies on the queue semantics below.
///
/// A sink must accept the fixed interleaved S16 stereo format; it may
/// negotiate the sample rate and buffer size through the spec it returns
/// from [AudioSink::open].
pub trait AudioSink {
    /// Open (or reopen) the device for the wanted spec.
    ///
    /// Returns the negotiated spec, or `None` if the device cannot be
    /// opened — playback then continues video-only.
    fn open(&mut self, want: &AudioSpec) -> Option<AudioSpec>;

    /// The number of appended-but-unplayed PCM bytes.
    fn queued_bytes(&self) -> usize;

    /// Append PCM bytes to the playback queue.
    fn queue(&mut self, pcm: &[u8]);

    /// Drop all queued, unplayed bytes.
    fn clear(&mut self);

    /// Pause or resume consumption of the queue.
    fn set_paused(&mut self, paused: bool);

    /// Close the device, dropping any queued bytes.
    fn close(&mut self);
}
