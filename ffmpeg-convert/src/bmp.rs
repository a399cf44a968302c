//! 24-bit Windows bitmap packing.

use bytes::{BufMut, BytesMut};

const FILE_HEADER_LEN: usize = 14;
const INFO_HEADER_LEN: usize = 40;
const PIXELS_OFFSET: usize = FILE_HEADER_LEN + INFO_HEADER_LEN;
/// 72 DPI.
const PIXELS_PER_METER: u32 = 2835;

/// Bytes per stored row, padded to a multiple of four.
pub fn row_size(width: u32) -> usize {
    (width as usize * 3).div_ceil(4) * 4
}

/// Packs top-down RGB24 rows (`width * 3` bytes each, no padding) into a
/// bottom-up BGR bitmap file.
pub fn encode_bmp24(width: u32, height: u32, rgb_rows: &[u8]) -> anyhow::Result<Vec<u8>> {
    let row_len = width as usize * 3;
    let expected = row_len * height as usize;
    if rgb_rows.len() != expected {
        anyhow::bail!(
            "{}x{} RGB24 image needs {} bytes, got {}",
            width,
            height,
            expected,
            rgb_rows.len()
        );
    }
    let stride = row_size(width);
    let data_size = stride * height as usize;
    let file_size = PIXELS_OFFSET + data_size;
    if u32::try_from(file_size).is_err() {
        anyhow::bail!("{}x{} bitmap exceeds 4 GiB", width, height);
    }

    let mut out = BytesMut::with_capacity(file_size);
    // BITMAPFILEHEADER
    out.put_slice(b"BM");
    out.put_u32_le(file_size as u32);
    out.put_u32_le(0);
    out.put_u32_le(PIXELS_OFFSET as u32);
    // BITMAPINFOHEADER, positive height = bottom-up
    out.put_u32_le(INFO_HEADER_LEN as u32);
    out.put_i32_le(width as i32);
    out.put_i32_le(height as i32);
    out.put_u16_le(1);
    out.put_u16_le(24);
    out.put_u32_le(0);
    out.put_u32_le(data_size as u32);
    out.put_u32_le(PIXELS_PER_METER);
    out.put_u32_le(PIXELS_PER_METER);
    out.put_u32_le(0);
    out.put_u32_le(0);

    if row_len > 0 {
        for row in rgb_rows.chunks_exact(row_len).rev() {
            for pixel in row.chunks_exact(3) {
                out.put_slice(&[pixel[2], pixel[1], pixel[0]]);
            }
            out.put_bytes(0, stride - row_len);
        }
    }
    Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_row_padding() {
        assert_eq!(row_size(1), 4);
        assert_eq!(row_size(4), 12);
        assert_eq!(row_size(5), 16);
        assert_eq!(row_size(0), 0);
    }

    #[test]
    fn test_headers() {
        let bmp = encode_bmp24(3, 2, &[0u8; 18]).unwrap();
        assert_eq!(&bmp[..2], b"BM");
        assert_eq!(bmp.len(), 54 + 12 * 2);
        assert_eq!(u32_at(&bmp, 2), bmp.len() as u32);
        assert_eq!(u32_at(&bmp, 10), 54);
        assert_eq!(u32_at(&bmp, 14), 40);
        assert_eq!(u32_at(&bmp, 18), 3);
        assert_eq!(u32_at(&bmp, 22), 2);
        assert_eq!(&bmp[26..30], &[1, 0, 24, 0]);
        assert_eq!(u32_at(&bmp, 34), 24);
        assert_eq!(u32_at(&bmp, 38), 2835);
        assert_eq!(u32_at(&bmp, 42), 2835);
    }

    #[test]
    fn test_pixels_bottom_up_bgr() {
        // top row red, bottom row blue
        let rgb = [255, 0, 0, 0, 0, 255];
        let bmp = encode_bmp24(1, 2, &rgb).unwrap();
        let pixels = &bmp[54..];
        assert_eq!(pixels, &[255, 0, 0, 0, 0, 0, 255, 0]);
    }

    #[test]
    fn test_padding_bytes_are_zero() {
        let rgb = [7u8; 5 * 3];
        let bmp = encode_bmp24(5, 1, &rgb).unwrap();
        assert_eq!(bmp.len(), 54 + 16);
        assert!(bmp[54..69].iter().all(|b| *b == 7));
        assert_eq!(bmp[69], 0);
    }

    #[test]
    fn test_rejects_short_input() {
        assert!(encode_bmp24(2, 2, &[0u8; 11]).is_err());
    }
}
