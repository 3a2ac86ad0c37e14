use std::ptr;

use rusty_ffmpeg::ffi as ffmpeg;

use crate::codec::{BaseDecoder, MediaFrame};
use crate::error;
use crate::packet::MediaPacket;

/// The decoder for processing video packets and producing planar frames.
///
/// Decoded frames are color-converted into the session-owned
/// [VideoSurface] in YUV 4:2:0 planar format at the stream's native
/// resolution, ready for the caller's presentation surface.
pub(crate) struct VideoDecoder {
    inner: BaseDecoder,
    sws: *mut ffmpeg::SwsContext,
    sws_src_format: ffmpeg::AVPixelFormat,
    width: usize,
    height: usize,
}

impl VideoDecoder {
    pub(crate) fn open(
        codec: &'static ffmpeg::AVCodec,
        codec_params: &ffmpeg::AVCodecParameters,
    ) -> Result<Self, error::FFmpegError> {
        let inner = BaseDecoder::open(codec, codec_params)?;
        let ctx = inner.as_ctx();
        Ok(Self {
            width: ctx.width as usize,
            height: ctx.height as usize,
            sws: ptr::null_mut(),
            sws_src_format: ffmpeg::AV_PIX_FMT_NONE,
            inner,
        })
    }

    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn send_packet(
        &mut self,
        packet: &MediaPacket,
    ) -> Result<(), error::FFmpegError> {
        self.inner.send_packet(packet)
    }

    pub(crate) fn receive_frame(
        &mut self,
        frame: &mut MediaFrame,
    ) -> Result<(), error::FFmpegError> {
        self.inner.receive_frame(frame)
    }

    pub(crate) fn flush(&mut self) {
        self.inner.flush()
    }

    /// Color-convert a decoded frame into `surface`.
    ///
    /// The scale context is created lazily from the first frame's pixel
    /// format and recreated if the stream changes format mid-play.
    pub(crate) fn convert_into(
        &mut self,
        frame: &MediaFrame,
        surface: &mut VideoSurface,
    ) -> Result<(), error::FFmpegError> {
        self.ensure_sws(frame.format)?;

        let (dst_planes, dst_strides) = surface.plane_ptrs();
        let result = unsafe {
            ffmpeg::sws_scale(
                self.sws,
                frame.data.as_ptr() as _,
                frame.linesize.as_ptr(),
                0,
                self.height as i32,
                dst_planes.as_ptr() as _,
                dst_strides.as_ptr(),
            )
        };
        error::convert_ff_result(result)?;
        Ok(())
    }

    fn ensure_sws(
        &mut self,
        src_format: ffmpeg::AVPixelFormat,
    ) -> Result<(), error::FFmpegError> {
        if !self.sws.is_null() && self.sws_src_format == src_format {
            return Ok(());
        }
        if !self.sws.is_null() {
            unsafe { ffmpeg::sws_freeContext(self.sws) };
            self.sws = ptr::null_mut();
        }

        let sws = unsafe {
            ffmpeg::sws_getContext(
                self.width as i32,
                self.height as i32,
                src_format,
                self.width as i32,
                self.height as i32,
                ffmpeg::AV_PIX_FMT_YUV420P,
                ffmpeg::SWS_BILINEAR as i32,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            )
        };
        if sws.is_null() {
            return Err(error::FFmpegError::custom(
                "failed to create scale context",
            ));
        }

        self.sws = sws;
        self.sws_src_format = src_format;
        Ok(())
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        if !self.sws.is_null() {
            unsafe { ffmpeg::sws_freeContext(self.sws) };
        }
    }
}

/// The presentable video frame buffer: three contiguous YUV 4:2:0 planes
/// sized to the stream's native resolution.
///
/// The surface is allocated once at load and overwritten in place by each
/// decoded frame; the caller reads the planes to update its presentation
/// texture every tick.
pub struct VideoSurface {
    width: usize,
    height: usize,
    offsets: [usize; 3],
    strides: [usize; 3],
    data: Vec<u8>,
}

impl VideoSurface {
    pub(crate) fn new(width: usize, height: usize) -> Self {
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);
        let luma_size = width * height;
        let chroma_size = chroma_width * chroma_height;
        Self {
            width,
            height,
            offsets: [0, luma_size, luma_size + chroma_size],
            strides: [width, chroma_width, chroma_width],
            data: vec![0; luma_size + chroma_size * 2],
        }
    }

    #[inline]
    /// The width of the surface in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    /// The height of the surface in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the raw bytes of the given plane (0 = Y, 1 = U, 2 = V).
    pub fn plane(&self, index: usize) -> &[u8] {
        assert!(index < 3, "index out of range");
        let start = self.offsets[index];
        let height = if index == 0 {
            self.height
        } else {
            self.height.div_ceil(2)
        };
        &self.data[start..start + self.strides[index] * height]
    }

    #[inline]
    /// Returns the stride of the given plane in bytes.
    pub fn stride(&self, index: usize) -> usize {
        assert!(index < 3, "index out of range");
        self.strides[index]
    }

    fn plane_ptrs(&mut self) -> ([*mut u8; 4], [i32; 4]) {
        let base = self.data.as_mut_ptr();
        let planes = [
            unsafe { base.add(self.offsets[0]) },
            unsafe { base.add(self.offsets[1]) },
            unsafe { base.add(self.offsets[2]) },
            ptr::null_mut(),
        ];
        let strides = [
            self.strides[0] as i32,
            self.strides[1] as i32,
            self.strides[2] as i32,
            0,
        ];
        (planes, strides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_plane_layout() {
        let surface = VideoSurface::new(640, 480);
        assert_eq!(surface.plane(0).len(), 640 * 480);
        assert_eq!(surface.plane(1).len(), 320 * 240);
        assert_eq!(surface.plane(2).len(), 320 * 240);
        assert_eq!(surface.stride(0), 640);
        assert_eq!(surface.stride(1), 320);
    }

    #[test]
    fn surface_rounds_odd_dimensions_up() {
        let surface = VideoSurface::new(639, 479);
        assert_eq!(surface.stride(1), 320);
        assert_eq!(surface.plane(1).len(), 320 * 240);
    }
}
