pub(crate) mod audio;
pub(crate) mod subtitle;
pub(crate) mod video;

use std::ptr;

use rusty_ffmpeg::ffi as ffmpeg;

use crate::error;
use crate::packet::MediaPacket;

/// Find a ffmpeg codec by ID.
///
/// Returns `None` if the codec does not exist.
pub(crate) fn find_decoder_by_id(
    id: ffmpeg::AVCodecID,
) -> Option<&'static ffmpeg::AVCodec> {
    let codec = unsafe { ffmpeg::avcodec_find_decoder(id) };
    if codec.is_null() {
        None
    } else {
        Some(unsafe { &*codec })
    }
}

/// A wrapper around a [ffmpeg::AVCodec] and context.
///
/// This implements the basic necessary logic for processing media packets
/// of any type and managing the lifecycle of the codec.
pub(crate) struct BaseDecoder {
    ctx: *mut ffmpeg::AVCodecContext,
}

impl BaseDecoder {
    /// Open a new [BaseDecoder] using the target codec and codec parameters.
    pub(crate) fn open(
        codec: &'static ffmpeg::AVCodec,
        codec_params: &ffmpeg::AVCodecParameters,
    ) -> Result<Self, error::FFmpegError> {
        let ctx = unsafe { ffmpeg::avcodec_alloc_context3(codec) };
        if ctx.is_null() {
            return Err(error::FFmpegError::custom(
                "failed to allocate codec context",
            ));
        }
        let decoder = Self { ctx };

        let result = unsafe {
            ffmpeg::avcodec_parameters_to_context(decoder.ctx, codec_params)
        };
        error::convert_ff_result(result)?;

        let result =
            unsafe { ffmpeg::avcodec_open2(decoder.ctx, codec, ptr::null_mut()) };
        error::convert_ff_result(result)?;

        tracing::debug!("opened decoder");

        Ok(decoder)
    }

    #[inline]
    pub(crate) fn as_ctx(&self) -> &ffmpeg::AVCodecContext {
        unsafe { &*self.ctx }
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut ffmpeg::AVCodecContext {
        self.ctx
    }

    /// Push packet data into the decoder.
    pub(crate) fn send_packet(
        &mut self,
        packet: &MediaPacket,
    ) -> Result<(), error::FFmpegError> {
        let result =
            unsafe { ffmpeg::avcodec_send_packet(self.ctx, packet.as_ptr()) };
        error::convert_ff_result(result)?;
        Ok(())
    }

    /// Attempt to receive a decoded frame from the decoder.
    ///
    /// A needs-data classified error is the normal "feed me more packets"
    /// stall signal, not a failure.
    pub(crate) fn receive_frame(
        &mut self,
        frame: &mut MediaFrame,
    ) -> Result<(), error::FFmpegError> {
        let result = unsafe { ffmpeg::avcodec_receive_frame(self.ctx, frame.ptr) };
        error::convert_ff_result(result)?;
        Ok(())
    }

    /// Discard all internal decoder state.
    ///
    /// Used on seek and track switch; the next packet fed in must start at
    /// a synchronization point.
    pub(crate) fn flush(&mut self) {
        unsafe { ffmpeg::avcodec_flush_buffers(self.ctx) }
    }
}

impl Drop for BaseDecoder {
    fn drop(&mut self) {
        if self.ctx.is_null() {
            return;
        }
        unsafe { ffmpeg::avcodec_free_context(&raw mut self.ctx) };
    }
}

/// An owned `AVFrame` used as the scratch target for decode calls.
pub(crate) struct MediaFrame {
    ptr: *mut ffmpeg::AVFrame,
}

impl MediaFrame {
    pub(crate) fn new() -> Result<Self, error::FFmpegError> {
        let frame = unsafe { ffmpeg::av_frame_alloc() };
        if frame.is_null() {
            Err(error::FFmpegError::custom("failed to allocate frame"))
        } else {
            Ok(Self { ptr: frame })
        }
    }

    pub(crate) fn reset(&mut self) {
        unsafe { ffmpeg::av_frame_unref(self.ptr) }
    }
}

impl std::ops::Deref for MediaFrame {
    type Target = ffmpeg::AVFrame;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.ptr }
    }
}

impl std::ops::DerefMut for MediaFrame {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.ptr }
    }
}

impl Drop for MediaFrame {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            self.reset();
            unsafe { ffmpeg::av_frame_free(&raw mut self.ptr) };
        }
    }
}
