use std::ffi::CStr;
use std::mem;

use rusty_ffmpeg::ffi as ffmpeg;

use crate::NO_PTS;
use crate::codec::BaseDecoder;
use crate::error;
use crate::packet::MediaPacket;
use crate::stream::TimeBase;

/// Fallback display duration for cues whose timing the container omits.
const DEFAULT_CUE_DURATION_MS: i64 = 5000;

/// A decoded subtitle cue, timed in container-timeline milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubtitleCue {
    pub kind: CueKind,
    pub start_ms: i64,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CueKind {
    /// A cue already carrying rasterizer markup; passed through unmodified.
    Markup(String),
    /// A plain-text cue that still needs escaping and templating.
    Text(String),
}

/// A decoder for processing subtitle streams.
pub(crate) struct SubtitleDecoder {
    inner: BaseDecoder,
}

impl SubtitleDecoder {
    pub(crate) fn open(
        codec: &'static ffmpeg::AVCodec,
        codec_params: &ffmpeg::AVCodecParameters,
    ) -> Result<Self, error::FFmpegError> {
        let inner = BaseDecoder::open(codec, codec_params)?;
        Ok(Self { inner })
    }

    pub(crate) fn flush(&mut self) {
        self.inner.flush()
    }

    /// Decode one subtitle packet into zero or more cues.
    ///
    /// Cue timestamps prefer the subtitle's own display-time fields and
    /// fall back to the packet's container timestamp, rebased through
    /// `time_base` into milliseconds.
    pub(crate) fn decode_packet(
        &mut self,
        packet: &MediaPacket,
        time_base: TimeBase,
    ) -> Result<Vec<SubtitleCue>, error::FFmpegError> {
        let mut sub: ffmpeg::AVSubtitle = unsafe { mem::zeroed() };
        let mut got = 0i32;
        let result = unsafe {
            ffmpeg::avcodec_decode_subtitle2(
                self.inner.as_mut_ptr(),
                &raw mut sub,
                &raw mut got,
                packet.as_ptr() as _,
            )
        };
        error::convert_ff_result(result)?;
        if got == 0 {
            return Ok(Vec::new());
        }

        // The decoder reports cue timing as a pair of millisecond offsets
        // from the subtitle PTS (in microseconds when valid).
        let base_ms = if sub.pts != NO_PTS {
            sub.pts / 1000
        } else {
            packet.pts().map(|pts| time_base.to_millis(pts)).unwrap_or(0)
        };
        let start_ms = base_ms + sub.start_display_time as i64;
        let duration_ms = if sub.end_display_time > sub.start_display_time {
            (sub.end_display_time - sub.start_display_time) as i64
        } else {
            packet
                .duration()
                .map(|duration| time_base.to_millis(duration))
                .unwrap_or(DEFAULT_CUE_DURATION_MS)
        };

        let mut cues = Vec::new();
        for index in 0..sub.num_rects as usize {
            let rect = unsafe { &**sub.rects.add(index) };
            let kind = if !rect.ass.is_null() {
                let markup = unsafe { CStr::from_ptr(rect.ass) }.to_string_lossy();
                (!markup.is_empty()).then(|| CueKind::Markup(markup.to_string()))
            } else if !rect.text.is_null() {
                let text = unsafe { CStr::from_ptr(rect.text) }.to_string_lossy();
                (!text.is_empty()).then(|| CueKind::Text(text.to_string()))
            } else {
                // Bitmap subtitles have no text payload for the rasterizer.
                None
            };

            if let Some(kind) = kind {
                cues.push(SubtitleCue {
                    kind,
                    start_ms,
                    duration_ms,
                });
            }
        }

        unsafe { ffmpeg::avsubtitle_free(&raw mut sub) };
        Ok(cues)
    }
}
