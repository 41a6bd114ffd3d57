// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion helpers
//!
//! All converters write interleaved 8-bit output. Callers validate buffer
//! lengths before converting; the helpers only read the first
//! `width * height` pixels.

/// Convert YUYV (YUV 4:2:2) to BGR
///
/// YUYV format: Y0 U Y1 V - each 4-byte group encodes 2 pixels sharing one
/// chroma pair. Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_bgr(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let row_bytes = w * 2;
    let mut bgr = Vec::with_capacity(w * h * 3);

    for row in data.chunks_exact(row_bytes).take(h) {
        for x in 0..w {
            let pair = (x & !1) * 2;
            let y = row[x * 2] as f32;
            let u = row[pair + 1] as f32 - 128.0;
            // A trailing odd pixel has no V sample of its own
            let v = row.get(pair + 3).map_or(0.0, |&v| v as f32 - 128.0);

            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

            bgr.push(b);
            bgr.push(g);
            bgr.push(r);
        }
    }

    bgr
}

/// Scale 16-bit little-endian greyscale to 8 bits (`floor(value / 256)`)
pub fn grey16_to_grey8(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = width as usize * height as usize;

    data.chunks_exact(2)
        .take(pixel_count)
        .map(|c| (u16::from_le_bytes([c[0], c[1]]) >> 8) as u8)
        .collect()
}

/// Copy the first `width * height * channels` bytes out of a pool buffer
///
/// The source buffer is handed back to the driver after decoding, so the
/// frame must own its pixels.
pub fn copy_packed(data: &[u8], width: u32, height: u32, channels: usize) -> Vec<u8> {
    let len = width as usize * height as usize * channels;
    data[..len.min(data.len())].to_vec()
}

/// Swap the first and third byte of every 3-byte pixel (RGB <-> BGR)
pub fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_bgr_white() {
        // Pure white in YUV (Y=255, U=128, V=128)
        let yuyv = vec![255u8, 128, 255, 128];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1);

        assert_eq!(bgr.len(), 6);
        assert!(bgr.iter().all(|&c| c > 250));
    }

    #[test]
    fn test_yuyv_red_chroma_lands_in_last_channel() {
        // Strong V pushes red up and leaves blue near luma
        let yuyv = vec![100u8, 128, 100, 220];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1);

        assert!(bgr[2] > bgr[0] + 50);
    }

    #[test]
    fn test_yuyv_odd_width() {
        // Three pixels per row: last pixel only has Y and U
        let yuyv = vec![128u8, 128, 128, 128, 128, 128];
        let bgr = yuyv_to_bgr(&yuyv, 3, 1);
        assert_eq!(bgr.len(), 9);
    }

    #[test]
    fn test_grey16_downscale() {
        let raw: Vec<u8> = [0u16, 255, 256, 8000, 65535]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(grey16_to_grey8(&raw, 5, 1), vec![0, 0, 1, 31, 255]);
    }

    #[test]
    fn test_grey16_pixel_count_does_not_overflow() {
        // 65536 * 65536 wraps a u32; only the bytes present are converted
        let raw = vec![0u8, 1, 0, 2];
        assert_eq!(grey16_to_grey8(&raw, 65536, 65536), vec![1, 2]);
    }

    #[test]
    fn test_swap_red_blue() {
        let mut px = vec![1u8, 2, 3, 4, 5, 6];
        swap_red_blue(&mut px);
        assert_eq!(px, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_copy_packed_ignores_trailing_bytes() {
        let raw = vec![9u8; 20];
        assert_eq!(copy_packed(&raw, 2, 2, 3).len(), 12);
    }
}
