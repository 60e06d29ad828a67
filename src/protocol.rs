use crate::color::Rgb;

const HEADER_LEN: usize = 6;

/// Adalight frame encoder.
///
/// The 6-byte header is fixed once the LED count is known: the 3-byte magic
/// word, (count - 1) high/low, and their XOR with 0x55. Each cycle rewrites
/// only the payload bytes of the reused buffer, so the frame length stays
/// `6 + 3 * led_count` for the process lifetime.
pub struct FrameEncoder {
    buf: Vec<u8>,
    led_count: usize,
}

impl FrameEncoder {
    pub fn new(magic: [u8; 3], led_count: usize) -> Self {
        debug_assert!(led_count >= 1);

        let count_hi = ((led_count - 1) >> 8) as u8;
        let count_lo = (led_count - 1) as u8;

        let mut buf = vec![0u8; HEADER_LEN + led_count * 3];
        buf[..3].copy_from_slice(&magic);
        buf[3] = count_hi;
        buf[4] = count_lo;
        buf[5] = count_hi ^ count_lo ^ 0x55;

        FrameEncoder { buf, led_count }
    }

    #[allow(dead_code)]
    pub fn frame_len(&self) -> usize {
        self.buf.len()
    }

    /// Write the colors into the payload, in wiring order, and return the
    /// complete frame.
    pub fn encode(&mut self, colors: &[Rgb]) -> &[u8] {
        debug_assert_eq!(colors.len(), self.led_count);

        for (chunk, color) in self.buf[HEADER_LEN..].chunks_exact_mut(3).zip(colors) {
            chunk[0] = color.r;
            chunk[1] = color.g;
            chunk[2] = color.b;
        }

        &self.buf
    }
}
