mod clock;
mod codec;
mod error;
mod input;
mod packet;
mod queue;
mod session;
mod sink;
mod stream;
mod subtitle;

use rusty_ffmpeg::ffi as ffmpeg;

pub use self::clock::PlaybackClock;
pub use self::codec::video::VideoSurface;
pub use self::error::{FFmpegError, PlayerError, Result};
pub use self::input::InputSource;
pub use self::packet::MediaPacket;
pub use self::queue::PacketQueue;
pub use self::session::{
    DemuxStatus,
    PlaybackSession,
    PlaybackSessionBuilder,
    TickOutcome,
};
pub use self::sink::{AudioSink, AudioSpec};
pub use self::stream::{Resolution, StreamInfo, TimeBase, Track};
pub use self::subtitle::{RasterBitmap, SubtitleCompositor, SubtitleRasterizer};

/// Sentinel for "no timestamp" on packets and frames.
///
/// Numerically identical to FFmpeg's `AV_NOPTS_VALUE`.
pub(crate) const NO_PTS: i64 = i64::MIN;

/// Playback speed above which audio decoding is disabled and the wall
/// clock becomes the master time source.
pub const AUDIO_SPEED_THRESHOLD: f64 = 2.0;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MediaType {
    /// Video data.
    Video,
    /// Audio data.
    Audio,
    /// Subtitle data.
    Subtitle,
    /// Opaque data information usually continuous.
    Data,
    /// Opaque data information usually sparse.
    Attachment,
    /// Usually treated as AVMEDIA_TYPE_DATA.
    Unknown,
}

impl From<ffmpeg::AVMediaType> for MediaType {
    fn from(value: ffmpeg::AVMediaType) -> Self {
        match value {
            ffmpeg::AVMEDIA_TYPE_VIDEO => Self::Video,
            ffmpeg::AVMEDIA_TYPE_AUDIO => Self::Audio,
            ffmpeg::AVMEDIA_TYPE_SUBTITLE => Self::Subtitle,
            ffmpeg::AVMEDIA_TYPE_DATA => Self::Data,
            ffmpeg::AVMEDIA_TYPE_ATTACHMENT => Self::Attachment,
            _ => Self::Unknown,
        }
    }
}
