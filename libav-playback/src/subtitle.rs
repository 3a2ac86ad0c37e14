use crate::codec::subtitle::{CueKind, SubtitleCue};

/// One positioned, colored, alpha-weighted bitmap produced by the
/// external rasterizer for a single render call.
#[derive(Debug, Clone)]
pub struct RasterBitmap {
    /// Horizontal placement on the target surface, in pixels.
    pub x: i32,
    /// Vertical placement on the target surface, in pixels.
    pub y: i32,
    /// Bitmap width in pixels.
    pub width: usize,
    /// Bitmap height in pixels.
    pub height: usize,
    /// Row stride of `alpha` in bytes.
    pub stride: usize,
    /// Straight (non-premultiplied) RGBA fill color; the alpha channel is
    /// the overall cue opacity.
    pub color: [u8; 4],
    /// Per-pixel coverage map, `height` rows of `stride` bytes.
    pub alpha: Vec<u8>,
}

/// The subtitle rasterizer boundary.
///
/// The engine feeds timed, marked-up dialogue lines into a per-stream
/// "track" and asks for the bitmaps active at a given millisecond
/// timestamp. Implementations (a libass binding, a test double) live
/// outside this crate.
pub trait SubtitleRasterizer {
    /// Create the per-stream track, seeded with the codec's header
    /// extradata and the play resolution.
    ///
    /// Returns `false` if the track cannot be created; subtitles are then
    /// silently unavailable for the stream.
    fn create_track(&mut self, header: &[u8], play_width: u32, play_height: u32)
    -> bool;

    /// Destroy the current track and every cue it holds.
    fn destroy_track(&mut self);

    /// Feed one marked-up dialogue line with start time and duration in
    /// milliseconds.
    fn feed_chunk(&mut self, line: &str, start_ms: i64, duration_ms: i64);

    /// Render the cues active at `now_ms` as positioned bitmaps.
    fn render(&mut self, now_ms: i64) -> Vec<RasterBitmap>;
}

/// Composites externally rasterized subtitle bitmaps onto a persistent
/// RGBA surface sized to the video frame.
pub struct SubtitleCompositor {
    rasterizer: Option<Box<dyn SubtitleRasterizer>>,
    width: usize,
    height: usize,
    surface: Vec<u8>,
    track_active: bool,
}

impl SubtitleCompositor {
    pub(crate) fn new(rasterizer: Option<Box<dyn SubtitleRasterizer>>) -> Self {
        Self {
            rasterizer,
            width: 0,
            height: 0,
            surface: Vec::new(),
            track_active: false,
        }
    }

    /// Size the RGBA surface to the video frame.
    pub(crate) fn set_frame_size(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.surface = vec![0; width * height * 4];
    }

    /// Open a fresh rasterizer track seeded from the stream header.
    ///
    /// Returns `false` when no rasterizer is attached or the rasterizer
    /// rejects the track.
    pub(crate) fn open_track(&mut self, header: &[u8]) -> bool {
        self.close_track();
        let Some(rasterizer) = self.rasterizer.as_mut() else {
            return false;
        };
        self.track_active =
            rasterizer.create_track(header, self.width as u32, self.height as u32);
        if !self.track_active {
            tracing::warn!("subtitle rasterizer rejected track, subtitles disabled");
        }
        self.track_active
    }

    /// Destroy the current rasterizer track, if any.
    pub(crate) fn close_track(&mut self) {
        if self.track_active {
            if let Some(rasterizer) = self.rasterizer.as_mut() {
                rasterizer.destroy_track();
            }
        }
        self.track_active = false;
    }

    #[inline]
    pub(crate) fn has_track(&self) -> bool {
        self.track_active
    }

    /// Feed one decoded cue into the rasterizer track.
    ///
    /// Pre-marked-up cues pass through unmodified; plain text is escaped
    /// and wrapped in a minimal dialogue-line template first.
    pub(crate) fn feed_cue(&mut self, cue: &SubtitleCue) {
        if !self.track_active {
            return;
        }
        let Some(rasterizer) = self.rasterizer.as_mut() else {
            return;
        };
        match &cue.kind {
            CueKind::Markup(line) => {
                rasterizer.feed_chunk(line, cue.start_ms, cue.duration_ms)
            },
            CueKind::Text(text) => {
                let line = dialogue_line(&escape_braces(text));
                rasterizer.feed_chunk(&line, cue.start_ms, cue.duration_ms)
            },
        }
    }

    /// Render the cues active at `now_ms` onto the surface.
    ///
    /// Returns `true` if the surface was repainted; `false` when no track
    /// is selected or no cue is active, in which case the surface is left
    /// untouched.
    pub(crate) fn render_at(&mut self, now_ms: i64) -> bool {
        if !self.track_active {
            return false;
        }
        let Some(rasterizer) = self.rasterizer.as_mut() else {
            return false;
        };

        let bitmaps = rasterizer.render(now_ms);
        if bitmaps.is_empty() {
            return false;
        }

        self.surface.fill(0);
        for bitmap in &bitmaps {
            blend_bitmap(&mut self.surface, self.width, self.height, bitmap);
        }
        true
    }

    /// The RGBA compositing surface, `width * height * 4` bytes.
    pub fn surface(&self) -> &[u8] {
        &self.surface
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }
}

/// Escape the rasterizer's directive delimiters in plain cue text.
fn escape_braces(text: &str) -> String {
    text.replace('{', "\\{").replace('}', "\\}")
}

/// Wrap escaped plain text in a minimal dialogue line the rasterizer's
/// track format understands.
fn dialogue_line(text: &str) -> String {
    format!("Dialogue: 0,0:00:00.00,0:00:05.00,Default,,0,0,0,,{text}")
}

/// Blend one bitmap onto the RGBA surface with the standard "over"
/// operator, clipping anything outside the surface bounds.
fn blend_bitmap(surface: &mut [u8], width: usize, height: usize, bitmap: &RasterBitmap) {
    let color = bitmap.color;
    let opacity = color[3] as f32 / 255.0;

    for row in 0..bitmap.height {
        let dst_y = bitmap.y as i64 + row as i64;
        if dst_y < 0 || dst_y >= height as i64 {
            continue;
        }
        for col in 0..bitmap.width {
            let dst_x = bitmap.x as i64 + col as i64;
            if dst_x < 0 || dst_x >= width as i64 {
                continue;
            }

            let coverage = bitmap.alpha[row * bitmap.stride + col] as f32 / 255.0;
            let src_a = coverage * opacity;
            if src_a <= 0.0 {
                continue;
            }

            let offset = (dst_y as usize * width + dst_x as usize) * 4;
            let dst_a = surface[offset + 3] as f32 / 255.0;
            let out_a = src_a + dst_a * (1.0 - src_a);
            for channel in 0..3 {
                let src_c = color[channel] as f32 / 255.0;
                let dst_c = surface[offset + channel] as f32 / 255.0;
                let out_c = if out_a > 0.0 {
                    (src_c * src_a + dst_c * dst_a * (1.0 - src_a)) / out_a
                } else {
                    0.0
                };
                surface[offset + channel] = (out_c * 255.0).round() as u8;
            }
            surface[offset + 3] = (out_a * 255.0).round() as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct MockState {
        track_created: usize,
        track_destroyed: usize,
        reject_track: bool,
        chunks: Vec<(String, i64, i64)>,
        bitmaps: Vec<RasterBitmap>,
    }

    struct MockRasterizer {
        state: Rc<RefCell<MockState>>,
    }

    impl SubtitleRasterizer for MockRasterizer {
        fn create_track(&mut self, _header: &[u8], _w: u32, _h: u32) -> bool {
            let mut state = self.state.borrow_mut();
            if state.reject_track {
                return false;
            }
            state.track_created += 1;
            true
        }

        fn destroy_track(&mut self) {
            self.state.borrow_mut().track_destroyed += 1;
        }

        fn feed_chunk(&mut self, line: &str, start_ms: i64, duration_ms: i64) {
            self.state
                .borrow_mut()
                .chunks
                .push((line.to_string(), start_ms, duration_ms));
        }

        fn render(&mut self, _now_ms: i64) -> Vec<RasterBitmap> {
            self.state.borrow().bitmaps.clone()
        }
    }

    fn compositor_with_state() -> (SubtitleCompositor, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        let rasterizer = MockRasterizer {
            state: Rc::clone(&state),
        };
        let mut compositor = SubtitleCompositor::new(Some(Box::new(rasterizer)));
        compositor.set_frame_size(8, 8);
        (compositor, state)
    }

    fn solid_bitmap(x: i32, y: i32, size: usize, color: [u8; 4]) -> RasterBitmap {
        RasterBitmap {
            x,
            y,
            width: size,
            height: size,
            stride: size,
            color,
            alpha: vec![255; size * size],
        }
    }

    #[test]
    fn render_without_track_is_false_and_untouched() {
        let (mut compositor, _state) = compositor_with_state();
        let before = compositor.surface().to_vec();
        assert!(!compositor.render_at(1000));
        assert_eq!(compositor.surface(), &before[..]);
    }

    #[test]
    fn deselect_is_idempotent() {
        let (mut compositor, state) = compositor_with_state();
        assert!(compositor.open_track(b"header"));

        compositor.close_track();
        compositor.close_track();
        assert_eq!(state.borrow().track_destroyed, 1);
        assert!(!compositor.render_at(0));
        assert!(!compositor.render_at(0));
    }

    #[test]
    fn rejected_track_degrades_silently() {
        let (mut compositor, state) = compositor_with_state();
        state.borrow_mut().reject_track = true;
        assert!(!compositor.open_track(b""));
        assert!(!compositor.has_track());
        assert!(!compositor.render_at(0));
    }

    #[test]
    fn plain_text_is_escaped_and_templated() {
        let (mut compositor, state) = compositor_with_state();
        compositor.open_track(b"");
        compositor.feed_cue(&SubtitleCue {
            kind: CueKind::Text("brace {pair}".to_string()),
            start_ms: 1500,
            duration_ms: 3000,
        });

        let state = state.borrow();
        let (line, start, duration) = &state.chunks[0];
        assert_eq!(
            line,
            "Dialogue: 0,0:00:00.00,0:00:05.00,Default,,0,0,0,,brace \\{pair\\}"
        );
        assert_eq!((*start, *duration), (1500, 3000));
    }

    #[test]
    fn markup_passes_through_unmodified() {
        let (mut compositor, state) = compositor_with_state();
        compositor.open_track(b"");
        let markup = "Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,{\\i1}styled";
        compositor.feed_cue(&SubtitleCue {
            kind: CueKind::Markup(markup.to_string()),
            start_ms: 1000,
            duration_ms: 1000,
        });
        assert_eq!(state.borrow().chunks[0].0, markup);
    }

    #[test]
    fn opaque_bitmap_paints_surface() {
        let (mut compositor, state) = compositor_with_state();
        compositor.open_track(b"");
        state.borrow_mut().bitmaps = vec![solid_bitmap(1, 1, 2, [255, 255, 255, 255])];

        assert!(compositor.render_at(0));
        let surface = compositor.surface();
        let offset = (1 * 8 + 1) * 4;
        assert_eq!(&surface[offset..offset + 4], &[255, 255, 255, 255]);
        // Pixels outside the bitmap stay transparent.
        assert_eq!(&surface[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn over_compositing_accumulates_alpha() {
        let (mut compositor, state) = compositor_with_state();
        compositor.open_track(b"");
        // Two half-opaque bitmaps stacked on the same pixel.
        state.borrow_mut().bitmaps = vec![
            solid_bitmap(0, 0, 1, [255, 0, 0, 128]),
            solid_bitmap(0, 0, 1, [255, 0, 0, 128]),
        ];

        assert!(compositor.render_at(0));
        let alpha = compositor.surface()[3] as f32 / 255.0;
        // out_a = a + a * (1 - a) with a ~= 0.502
        let a = 128.0 / 255.0;
        let expected = a + a * (1.0 - a);
        assert!((alpha - expected).abs() < 0.02);
    }

    #[test]
    fn out_of_bounds_bitmap_is_clipped() {
        let (mut compositor, state) = compositor_with_state();
        compositor.open_track(b"");
        state.borrow_mut().bitmaps = vec![solid_bitmap(6, 6, 4, [0, 255, 0, 255])];

        assert!(compositor.render_at(0));
        let surface = compositor.surface();
        let inside = (7 * 8 + 7) * 4;
        assert_eq!(&surface[inside..inside + 4], &[0, 255, 0, 255]);
        // Nothing panicked and the clipped portion never landed anywhere.
        assert_eq!(&surface[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn empty_render_leaves_previous_surface() {
        let (mut compositor, state) = compositor_with_state();
        compositor.open_track(b"");
        state.borrow_mut().bitmaps = vec![solid_bitmap(0, 0, 1, [9, 9, 9, 255])];
        assert!(compositor.render_at(0));
        let painted = compositor.surface().to_vec();

        state.borrow_mut().bitmaps.clear();
        assert!(!compositor.render_at(100));
        assert_eq!(compositor.surface(), &painted[..]);
    }
}
