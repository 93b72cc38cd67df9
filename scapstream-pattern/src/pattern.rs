//! Moving-gradient BGRA frames.

/// Generates successive test-pattern frames into a reused buffer.
///
/// Blue ramps left to right, green top to bottom, and red carries the
/// frame number, with the whole image scrolling one column per frame so
/// motion is visible and every frame differs from the last.
#[derive(Debug)]
pub struct PatternGenerator {
    width: u32,
    height: u32,
    frame: u64,
    buf: Vec<u8>,
}

impl PatternGenerator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: 0,
            buf: vec![0u8; width as usize * height as usize * 4],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frames generated so far.
    pub fn frames_generated(&self) -> u64 {
        self.frame
    }

    /// Render the next frame and return its pixels.
    pub fn next_frame(&mut self) -> &[u8] {
        if self.buf.is_empty() {
            self.frame += 1;
            return &self.buf;
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = self.frame as usize;
        let red = (self.frame % 256) as u8;

        let (x_span, y_span) = (w.max(2) - 1, h.max(2) - 1);

        for (y, row) in self.buf.chunks_exact_mut(w * 4).enumerate() {
            let green = (y * 255 / y_span) as u8;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let blue = ((x + shift) % w * 255 / x_span) as u8;
                px.copy_from_slice(&[blue, green, red, 0xFF]);
            }
        }

        self.frame += 1;
        &self.buf
    }
}
