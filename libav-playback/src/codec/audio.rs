use std::mem;
use std::ptr;

use rusty_ffmpeg::ffi as ffmpeg;

use crate::codec::{BaseDecoder, MediaFrame};
use crate::error;
use crate::packet::MediaPacket;

/// Number of interleaved channels in the engine's fixed output format.
pub(crate) const OUTPUT_CHANNELS: usize = 2;
/// Bytes per sample in the engine's fixed signed 16-bit output format.
pub(crate) const BYTES_PER_SAMPLE: usize = mem::size_of::<i16>();
/// Bytes per interleaved output frame (one sample for every channel).
pub(crate) const BYTES_PER_FRAME: usize = OUTPUT_CHANNELS * BYTES_PER_SAMPLE;

/// The decoder for processing audio packets and producing audio frames.
pub(crate) struct AudioDecoder {
    inner: BaseDecoder,
}

impl AudioDecoder {
    pub(crate) fn open(
        codec: &'static ffmpeg::AVCodec,
        codec_params: &ffmpeg::AVCodecParameters,
    ) -> Result<Self, error::FFmpegError> {
        let inner = BaseDecoder::open(codec, codec_params)?;
        Ok(Self { inner })
    }

    #[inline]
    /// The sample rate the stream decodes at.
    pub(crate) fn sample_rate(&self) -> u32 {
        self.inner.as_ctx().sample_rate as u32
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

    pub(crate) fn as_ctx(&self) -> &ffmpeg::AVCodecContext {
        self.inner.as_ctx()
    }
}

/// Converts decoded audio frames into the engine's fixed output format:
/// interleaved signed 16-bit stereo at the device's negotiated rate.
pub(crate) struct Resampler {
    ctx: *mut ffmpeg::SwrContext,
    in_rate: i32,
    out_rate: i32,
}

impl Resampler {
    /// Configure a resampler from the decoder's input format to the
    /// negotiated device rate.
    pub(crate) fn new(
        decoder_ctx: &ffmpeg::AVCodecContext,
        out_rate: i32,
    ) -> Result<Self, error::FFmpegError> {
        let mut out_layout: ffmpeg::AVChannelLayout = unsafe { mem::zeroed() };
        unsafe {
            ffmpeg::av_channel_layout_default(
                &raw mut out_layout,
                OUTPUT_CHANNELS as i32,
            )
        };

        let mut ctx = ptr::null_mut();
        let result = unsafe {
            ffmpeg::swr_alloc_set_opts2(
                &raw mut ctx,
                &raw const out_layout,
                ffmpeg::AV_SAMPLE_FMT_S16,
                out_rate,
                &raw const decoder_ctx.ch_layout,
                decoder_ctx.sample_fmt,
                decoder_ctx.sample_rate,
                0,
                ptr::null_mut(),
            )
        };
        error::convert_ff_result(result)?;

        let result = unsafe { ffmpeg::swr_init(ctx) };
        if let Err(err) = error::convert_ff_result(result) {
            unsafe { ffmpeg::swr_free(&raw mut ctx) };
            return Err(err);
        }

        Ok(Self {
            ctx,
            in_rate: decoder_ctx.sample_rate,
            out_rate,
        })
    }

    /// Convert one decoded frame into `out`, returning the number of
    /// output samples produced per channel.
    ///
    /// `out` is resized to exactly the converted payload.
    pub(crate) fn convert(
        &mut self,
        frame: &MediaFrame,
        out: &mut Vec<u8>,
    ) -> Result<usize, error::FFmpegError> {
        let delay = unsafe { ffmpeg::swr_get_delay(self.ctx, self.in_rate as i64) };
        let out_samples = unsafe {
            ffmpeg::av_rescale_rnd(
                delay + frame.nb_samples as i64,
                self.out_rate as i64,
                self.in_rate as i64,
                ffmpeg::AV_ROUND_UP,
            )
        };

        out.resize(out_samples as usize * BYTES_PER_FRAME, 0);
        let mut out_planes = [out.as_mut_ptr(), ptr::null_mut()];
        let converted = unsafe {
            ffmpeg::swr_convert(
                self.ctx,
                out_planes.as_mut_ptr() as _,
                out_samples as i32,
                frame.extended_data as _,
                frame.nb_samples,
            )
        };
        let converted = error::convert_ff_result(converted)?;

        out.truncate(converted as usize * BYTES_PER_FRAME);
        Ok(converted as usize)
    }

    /// The duration of samples currently buffered inside the resampler,
    /// in seconds of output time.
    pub(crate) fn delay_seconds(&self) -> f64 {
        let delay = unsafe { ffmpeg::swr_get_delay(self.ctx, self.out_rate as i64) };
        delay.max(0) as f64 / self.out_rate as f64
    }
}

impl Drop for Resampler {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe { ffmpeg::swr_free(&raw mut self.ctx) };
        }
    }
}

/// Apply a linear volume gain to interleaved signed 16-bit samples,
/// hard-clipping at the numeric range of the format.
pub(crate) fn apply_gain(pcm: &mut [u8], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for sample in pcm.chunks_exact_mut(BYTES_PER_SAMPLE) {
        let value = i16::from_ne_bytes([sample[0], sample[1]]) as f32 * gain;
        let clipped = value.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        sample.copy_from_slice(&clipped.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn to_bytes(samples: &[i16]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|sample| sample.to_ne_bytes())
            .collect()
    }

    fn to_samples(pcm: &[u8]) -> Vec<i16> {
        pcm.chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn full_scale_at_plus_twelve_db_stays_in_range() {
        // +12 dB is a gain of ~3.98; every sample must saturate rather
        // than wrap.
        let gain = 10f32.powf(12.0 / 20.0);
        let mut pcm = to_bytes(&[i16::MAX, i16::MIN, 12_345, -12_345]);
        apply_gain(&mut pcm, gain);
        let samples = to_samples(&pcm);
        assert_eq!(samples[0], i16::MAX);
        assert_eq!(samples[1], i16::MIN);
        assert_eq!(samples[2], i16::MAX);
        assert_eq!(samples[3], i16::MIN);
    }

    #[rstest]
    #[case(0.0, 1000, 0)]
    #[case(0.5, 1000, 500)]
    #[case(2.0, 1000, 2000)]
    #[case(2.0, -1000, -2000)]
    fn gain_scales_samples(
        #[case] gain: f32,
        #[case] input: i16,
        #[case] expected: i16,
    ) {
        let mut pcm = to_bytes(&[input]);
        apply_gain(&mut pcm, gain);
        assert_eq!(to_samples(&pcm), vec![expected]);
    }

    #[test]
    fn unity_gain_is_a_no_op() {
        let original = to_bytes(&[1, -1, 32_000, -32_000]);
        let mut pcm = original.clone();
        apply_gain(&mut pcm, 1.0);
        assert_eq!(pcm, original);
    }
}
