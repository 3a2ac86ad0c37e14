use rusty_ffmpeg::ffi as ffmpeg;

use crate::NO_PTS;
use crate::error;

/// An owned compressed packet read from the container.
///
/// The packet owns its underlying `AVPacket` allocation for its whole
/// lifetime; moving a [MediaPacket] (into a queue, out of a queue, into the
/// pending slot) transfers ownership without copying the payload.
#[derive(Debug)]
pub struct MediaPacket {
    ptr: *mut ffmpeg::AVPacket,
}

impl MediaPacket {
    /// Allocate a new, empty packet.
    pub fn new() -> Result<Self, error::FFmpegError> {
        let packet = unsafe { ffmpeg::av_packet_alloc() };
        if packet.is_null() {
            Err(error::FFmpegError::custom("failed to allocate packet"))
        } else {
            Ok(Self { ptr: packet })
        }
    }

    #[inline]
    /// Returns the index of the elementary stream this packet belongs to.
    pub fn stream_index(&self) -> usize {
        unsafe { (*self.ptr).stream_index as usize }
    }

    #[inline]
    /// Returns the presentation timestamp in the stream time base,
    /// or `None` if the container did not provide one.
    pub fn pts(&self) -> Option<i64> {
        let pts = unsafe { (*self.ptr).pts };
        (pts != NO_PTS).then_some(pts)
    }

    #[inline]
    /// Returns the packet duration in the stream time base, if known.
    pub fn duration(&self) -> Option<i64> {
        let duration = unsafe { (*self.ptr).duration };
        (duration > 0).then_some(duration)
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut ffmpeg::AVPacket {
        self.ptr
    }

    /// Drop any payload held by the packet, keeping the allocation.
    pub fn reset(&mut self) {
        unsafe { ffmpeg::av_packet_unref(self.ptr) }
    }
}

impl Drop for MediaPacket {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            self.reset();
            unsafe { ffmpeg::av_packet_free(&raw mut self.ptr) };
        }
    }
}
