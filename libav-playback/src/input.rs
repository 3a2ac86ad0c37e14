use std::ffi::CString;
use std::fmt::Formatter;
use std::path::Path;
use std::ptr;
use std::str::FromStr;

use rusty_ffmpeg::ffi as ffmpeg;

use crate::error;
use crate::packet::MediaPacket;
use crate::stream::StreamInfo;

/// The input source is a demultiplexed media container holding video,
/// audio and subtitle elementary streams.
///
/// Internally this wraps ffmpeg's format input system, so any container
/// supported by ffmpeg should be supported by this source.
pub struct InputSource {
    url: url::Url,
    ctx: ptr::NonNull<ffmpeg::AVFormatContext>,
    streams: Vec<StreamInfo>,
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InputSource(url={})", self.url.as_str())
    }
}

impl InputSource {
    /// Creates a new [InputSource] using the file path to the given media.
    ///
    /// This is a helper method around [InputSource::open_url] and will
    /// convert the file path into a valid URL for FFmpeg to open.
    pub fn open_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let resolved_path = path
            .as_ref()
            .canonicalize()
            .expect("canonicalize should not fail in normal circumstances");
        let url = format!("file://{}", resolved_path.display())
            .parse()
            .expect("url parses should not fail");
        Self::open_url(url)
    }

    /// Create a new [InputSource] using the provided [url::Url].
    ///
    /// WARNING:
    /// This method can block for an arbitrary amount of time as FFmpeg
    /// probes the source.
    pub fn open_url(url: url::Url) -> crate::Result<Self> {
        let url_cstr = CString::from_str(url.as_str())
            .expect("provided URL should never reasonably contain a null terminator mid string");

        let mut ctx = ptr::null_mut();
        let result = unsafe {
            ffmpeg::avformat_open_input(
                &raw mut ctx,
                url_cstr.as_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        error::convert_ff_result(result).map_err(crate::PlayerError::from)?;

        let Some(ctx) = ptr::NonNull::new(ctx) else {
            panic!("ffmpeg::avformat_open_input returned null after returning a successful result code");
        };

        let mut source = Self {
            url,
            ctx,
            streams: Vec::new(),
        };
        source.init_source()?;
        Ok(source)
    }

    fn init_source(&mut self) -> crate::Result<()> {
        let result = unsafe {
            ffmpeg::avformat_find_stream_info(self.ctx.as_ptr(), ptr::null_mut())
        };
        error::convert_ff_result(result).map_err(crate::PlayerError::from)?;

        let ptr = self.ctx.as_ptr();
        let num_streams = unsafe { (*ptr).nb_streams as usize };
        self.streams = (0..num_streams)
            .map(|index| {
                let stream = unsafe { *(*ptr).streams.add(index) };
                unsafe { StreamInfo::from_raw(stream) }
            })
            .collect();

        tracing::debug!(
            url = %self.url,
            num_streams = num_streams,
            "opened input source",
        );

        Ok(())
    }

    /// Returns the duration of the source in seconds, or `0.0` if the
    /// container does not report one.
    pub fn duration_seconds(&self) -> f64 {
        let duration = unsafe { (*self.ctx.as_ptr()).duration };
        if duration == crate::NO_PTS || duration <= 0 {
            return 0.0;
        }
        duration as f64 / ffmpeg::AV_TIME_BASE as f64
    }

    /// Returns a reference to the source's URL.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Returns the immutable stream table built when the source was opened.
    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    /// Returns the stream at the given container index.
    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.get(index)
    }

    pub(crate) fn codec_params(
        &self,
        index: usize,
    ) -> Option<&ffmpeg::AVCodecParameters> {
        if index >= self.streams.len() {
            return None;
        }
        let ptr = self.ctx.as_ptr();
        unsafe {
            let stream = *(*ptr).streams.add(index);
            (*stream).codecpar.as_ref()
        }
    }

    /// Read the next packet from the container into `packet`.
    ///
    /// Returns an EOF-classified error when the container is exhausted; the
    /// caller distinguishes it with [FFmpegError::is_eof](crate::FFmpegError::is_eof).
    pub fn read_into(
        &mut self,
        packet: &mut MediaPacket,
    ) -> Result<(), error::FFmpegError> {
        packet.reset();
        let result =
            unsafe { ffmpeg::av_read_frame(self.ctx.as_ptr(), packet.as_ptr()) };
        error::convert_ff_result(result)?;
        Ok(())
    }

    /// Seek the container to `ts` (in the time base of `stream_index`),
    /// biased backward to the nearest preceding synchronization point.
    pub fn seek_backward(
        &mut self,
        stream_index: usize,
        ts: i64,
    ) -> Result<(), error::FFmpegError> {
        let result = unsafe {
            ffmpeg::av_seek_frame(
                self.ctx.as_ptr(),
                stream_index as i32,
                ts,
                ffmpeg::AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        error::convert_ff_result(result)?;
        Ok(())
    }
}

// SAFETY: We are allowed to close the format context from a different thread
//         to where we called `avformat_open_input`.
unsafe impl Send for InputSource {}

impl Drop for InputSource {
    fn drop(&mut self) {
        let mut ptr = self.ctx.as_ptr();
        unsafe { ffmpeg::avformat_close_input(&raw mut ptr) }
    }
}
