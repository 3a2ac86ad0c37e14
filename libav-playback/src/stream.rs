use std::ffi::CStr;
use std::ptr;

use rusty_ffmpeg::ffi as ffmpeg;

use crate::MediaType;

#[derive(Clone)]
/// A single immutable audio, video or subtitle stream from an
/// [InputSource](crate::InputSource).
pub struct StreamInfo {
    /// The media type of the stream.
    pub media_type: MediaType,
    /// The index position of the stream within the container.
    pub index: usize,
    /// The time base the stream's timestamps are expressed in.
    pub time_base: TimeBase,
    /// The resolution of the stream, providing it is a video stream.
    pub resolution: Option<Resolution>,
    /// The name of the media codec this stream uses.
    pub codec_name: String,
    /// The stream title from the container metadata, if present.
    pub title: Option<String>,
    /// The stream language code from the container metadata, if present.
    pub language: Option<String>,
    /// Codec-private header data (e.g. the subtitle style header).
    pub extradata: Vec<u8>,
    pub(crate) codec_id: ffmpeg::AVCodecID,
}

impl std::fmt::Debug for StreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInfo")
            .field("media_type", &self.media_type)
            .field("index", &self.index)
            .field("time_base", &self.time_base)
            .field("resolution", &self.resolution)
            .field("codec_name", &self.codec_name)
            .field("title", &self.title)
            .field("language", &self.language)
            .finish()
    }
}

impl StreamInfo {
    /// Creates a new [StreamInfo] using the given raw pointer.
    pub(crate) unsafe fn from_raw(ctx: *const ffmpeg::AVStream) -> Self {
        assert!(!ctx.is_null());

        let stream = unsafe { &*ctx };
        let codec_params = unsafe { &*stream.codecpar };

        let media_type = MediaType::from(codec_params.codec_type);
        let index = stream.index as usize;
        let time_base = TimeBase::new(stream.time_base.num, stream.time_base.den);

        let mut resolution = None;
        if media_type == MediaType::Video {
            resolution = Some(Resolution {
                width: codec_params.width as usize,
                height: codec_params.height as usize,
            });
        }

        let codec_name = unsafe {
            let name = ffmpeg::avcodec_get_name(codec_params.codec_id);
            CStr::from_ptr(name).to_string_lossy().to_string()
        };

        let title = unsafe { dict_value(stream.metadata, c"title".as_ptr()) };
        let language = unsafe { dict_value(stream.metadata, c"language".as_ptr()) };

        let mut extradata = Vec::new();
        if !codec_params.extradata.is_null() && codec_params.extradata_size > 0 {
            extradata = unsafe {
                std::slice::from_raw_parts(
                    codec_params.extradata,
                    codec_params.extradata_size as usize,
                )
                .to_vec()
            };
        }

        Self {
            media_type,
            index,
            time_base,
            resolution,
            codec_name,
            title,
            language,
            extradata,
            codec_id: codec_params.codec_id,
        }
    }

    pub(crate) fn codec(&self) -> Option<&'static ffmpeg::AVCodec> {
        crate::codec::find_decoder_by_id(self.codec_id)
    }

    /// Returns the human-readable name a track list should display for
    /// this stream.
    ///
    /// `kind` is the fallback label ("Audio" / "Subtitles") used when the
    /// container provides neither a title nor a language for the stream.
    pub fn display_name(&self, kind: &str) -> String {
        track_display_name(
            self.title.as_deref(),
            self.language.as_deref(),
            &self.codec_name,
            kind,
        )
    }
}

/// Derive a track display name from container metadata, preferring an
/// explicit title, then the language code, then the codec name.
pub(crate) fn track_display_name(
    title: Option<&str>,
    language: Option<&str>,
    codec_name: &str,
    kind: &str,
) -> String {
    if let Some(title) = title.filter(|value| !value.is_empty()) {
        title.to_string()
    } else if let Some(language) = language.filter(|value| !value.is_empty()) {
        format!("{language} ({codec_name})")
    } else {
        format!("{kind} ({codec_name})")
    }
}

unsafe fn dict_value(
    dict: *mut ffmpeg::AVDictionary,
    key: *const std::ffi::c_char,
) -> Option<String> {
    let entry = unsafe { ffmpeg::av_dict_get(dict, key, ptr::null(), 0) };
    if entry.is_null() {
        return None;
    }
    let value = unsafe { CStr::from_ptr((*entry).value) };
    let value = value.to_string_lossy();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The rational time base timestamps of a stream are expressed in.
pub struct TimeBase {
    num: i32,
    den: i32,
}

impl TimeBase {
    pub(crate) fn new(num: i32, den: i32) -> Self {
        // Containers occasionally report a degenerate time base; fall back
        // to milliseconds so timestamp math stays finite.
        if num <= 0 || den <= 0 {
            Self { num: 1, den: 1000 }
        } else {
            Self { num, den }
        }
    }

    #[inline]
    /// Convert a timestamp in this time base to seconds.
    pub fn to_seconds(&self, ts: i64) -> f64 {
        ts as f64 * self.num as f64 / self.den as f64
    }

    #[inline]
    /// Convert a timestamp in this time base to whole milliseconds.
    pub fn to_millis(&self, ts: i64) -> i64 {
        (self.to_seconds(ts) * 1000.0).round() as i64
    }

    #[inline]
    /// Convert a position in seconds into this time base.
    pub fn from_seconds(&self, seconds: f64) -> i64 {
        (seconds * self.den as f64 / self.num as f64) as i64
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
/// The resolution of a video stream.
pub struct Resolution {
    /// The width of the video resolution in pixels.
    pub width: usize,
    /// The height of the video resolution in pixels.
    pub height: usize,
}

#[derive(Debug, Clone)]
/// An immutable entry in the session's audio or subtitle track list.
pub struct Track {
    /// The index of the elementary stream backing this track.
    pub stream_index: usize,
    /// The name a selection menu should display for this track.
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some("Director Commentary"), Some("eng"), "aac", "Director Commentary")]
    #[case(None, Some("eng"), "aac", "eng (aac)")]
    #[case(Some(""), Some("jpn"), "opus", "jpn (opus)")]
    #[case(None, None, "ac3", "Audio (ac3)")]
    #[case(Some(""), Some(""), "subrip", "Subtitles (subrip)")]
    fn display_name_priority(
        #[case] title: Option<&str>,
        #[case] language: Option<&str>,
        #[case] codec: &str,
        #[case] expected: &str,
    ) {
        let kind = if codec == "subrip" { "Subtitles" } else { "Audio" };
        assert_eq!(track_display_name(title, language, codec, kind), expected);
    }

    #[test]
    fn time_base_round_trips_seconds() {
        let tb = TimeBase::new(1, 90_000);
        let ts = tb.from_seconds(12.5);
        assert_eq!(ts, 1_125_000);
        assert!((tb.to_seconds(ts) - 12.5).abs() < 1e-9);
        assert_eq!(tb.to_millis(ts), 12_500);
    }

    #[test]
    fn degenerate_time_base_falls_back_to_millis() {
        let tb = TimeBase::new(0, 0);
        assert_eq!(tb.to_millis(250), 250);
    }
}
