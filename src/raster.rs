//! Row-major, interleaved-channel 8-bit raster images.
//!
//! On-disk format: `<magic><newline>[# comment\n]<cols> <rows>\n<maxval>\n<data>`,
//! where `<magic>` is `P5` (1 channel), `P6` (3 channels), `P2`/`P3` (ASCII
//! variants, read-only), or `H<n>` (n channels). Data is row-major,
//! interleaved by channel, one byte per channel per pixel.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// A raw multi-channel 8-bit raster, `data[r*cols*chans + c*chans + ch]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub rows: usize,
    pub cols: usize,
    pub chans: usize,
    pub data: Vec<u8>,
}

impl RasterImage {
    pub fn new(rows: usize, cols: usize, chans: usize) -> Self {
        assert!(rows > 0 && cols > 0 && chans > 0);
        RasterImage { rows, cols, chans, data: vec![0u8; rows * cols * chans] }
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize, ch: usize) -> u8 {
        self.data[(r * self.cols + c) * self.chans + ch]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, ch: usize, val: u8) {
        self.data[(r * self.cols + c) * self.chans + ch] = val;
    }

    #[inline]
    pub fn in_bounds(&self, r: i64, c: i64, ch: i64) -> bool {
        r >= 0 && (r as usize) < self.rows && c >= 0 && (c as usize) < self.cols && ch >= 0 && (ch as usize) < self.chans
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<RasterImage> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        parse_raster(&bytes).ok_or_else(|| Error::Format {
            path: Some(path.to_path_buf()),
            context: "malformed raster header".to_string(),
        })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        match self.chans {
            1 => writeln!(writer, "P5")?,
            3 => writeln!(writer, "P6")?,
            n => writeln!(writer, "H{}", n)?,
        }
        writeln!(writer, "{} {}", self.cols, self.rows)?;
        writeln!(writer, "255")?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

/// A dense per-pixel class-label raster. Label `0` is reserved for
/// unclassified/background; label `255` is `ERROR_CLASS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelImage {
    pub rows: usize,
    pub cols: usize,
    pub label: Vec<u8>,
}

impl LabelImage {
    pub fn new(rows: usize, cols: usize) -> Self {
        LabelImage { rows, cols, label: vec![0u8; rows * cols] }
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> u8 {
        self.label[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, val: u8) {
        self.label[r * self.cols + c] = val;
    }
}

/// Split off a single whitespace-delimited token, skipping `#`-led comment
/// lines, returning the token and the index just past it.
fn next_token(bytes: &[u8], mut pos: usize) -> Option<(&[u8], usize)> {
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b'#' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        break;
    }
    if pos >= bytes.len() {
        return None;
    }
    let start = pos;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    Some((&bytes[start..pos], pos))
}

fn parse_raster(bytes: &[u8]) -> Option<RasterImage> {
    let (magic, mut pos) = next_token(bytes, 0)?;
    let magic = std::str::from_utf8(magic).ok()?;

    let (ascii, chans) = match magic {
        "P5" => (false, 1usize),
        "P6" => (false, 3usize),
        "P2" => (true, 1usize),
        "P3" => (true, 3usize),
        other if other.starts_with('H') => {
            let n: usize = other[1..].parse().ok()?;
            (false, n)
        }
        _ => return None,
    };

    let (cols_tok, p) = next_token(bytes, pos)?;
    pos = p;
    let cols: usize = std::str::from_utf8(cols_tok).ok()?.parse().ok()?;
    let (rows_tok, p) = next_token(bytes, pos)?;
    pos = p;
    let rows: usize = std::str::from_utf8(rows_tok).ok()?.parse().ok()?;
    let (_maxval_tok, p) = next_token(bytes, pos)?;
    pos = p;

    if rows == 0 || cols == 0 || chans == 0 {
        return None;
    }

    // exactly one whitespace byte separates the maxval token from the data
    pos += 1;

    let mut image = RasterImage::new(rows, cols, chans);

    if ascii {
        let mut idx = 0usize;
        for r in 0..rows {
            for c in 0..cols {
                for ch in 0..chans {
                    let (tok, p) = next_token(bytes, pos)?;
                    pos = p;
                    let v: i64 = std::str::from_utf8(tok).ok()?.parse().ok()?;
                    image.set(r, c, ch, v.clamp(0, 255) as u8);
                    idx += 1;
                }
            }
        }
        let _ = idx;
    } else {
        let needed = rows * cols * chans;
        if pos + needed > bytes.len() {
            return None;
        }
        image.data.copy_from_slice(&bytes[pos..pos + needed]);
    }

    Some(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_p5() {
        let mut img = RasterImage::new(3, 4, 1);
        for i in 0..img.data.len() {
            img.data[i] = (i * 7 % 256) as u8;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.pgm");
        img.write(&path).unwrap();
        let back = RasterImage::read(&path).unwrap();
        assert_eq!(img, back);
    }

    #[test]
    fn roundtrip_p6() {
        let mut img = RasterImage::new(2, 2, 3);
        for i in 0..img.data.len() {
            img.data[i] = (i * 37 % 256) as u8;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("color.ppm");
        img.write(&path).unwrap();
        let back = RasterImage::read(&path).unwrap();
        assert_eq!(img, back);
    }

    #[test]
    fn roundtrip_multichannel() {
        let mut img = RasterImage::new(5, 5, 6);
        for i in 0..img.data.len() {
            img.data[i] = (i * 13 % 256) as u8;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.dat");
        img.write(&path).unwrap();
        let back = RasterImage::read(&path).unwrap();
        assert_eq!(img, back);
        assert_eq!(back.chans, 6);
    }

    #[test]
    fn rejects_truncated_data() {
        let bytes = b"P5\n4 4\n255\n\x01\x02".to_vec();
        assert!(parse_raster(&bytes).is_none());
    }

    #[test]
    fn skips_comment_line() {
        let mut img = RasterImage::new(2, 2, 1);
        img.data.copy_from_slice(&[10, 20, 30, 40]);
        let mut bytes = b"P5\n# a comment\n2 2\n255\n".to_vec();
        bytes.extend_from_slice(&img.data);
        let parsed = parse_raster(&bytes).unwrap();
        assert_eq!(parsed, img);
    }
}
