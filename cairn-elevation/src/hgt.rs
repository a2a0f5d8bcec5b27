//! # HGT tile decoding
//!
//! SRTM distributes elevation as one-degree square rasters of signed
//! big-endian 16-bit samples, row-major from the north edge southward.
//! The shape is implied entirely by the file size; nothing else in the
//! file is self-describing.

use zerocopy::{BigEndian, FromBytes, I16};

/// Sample value marking a radar void.
pub const VOID_SAMPLE: i16 = -32768;

/// File length of a 3-arc-second tile (1201 x 1201 samples).
pub const SRTM3_FILE_LEN: usize = 2 * 1201 * 1201;

/// File length of a 1-arc-second tile (3601 x 3601 samples).
pub const SRTM1_FILE_LEN: usize = 2 * 3601 * 3601;

/// A decoded HGT raster held in memory.
///
/// Rows run north to south; columns west to east. The edges of adjacent
/// tiles overlap by one sample row/column, which is why the per-side count
/// is `3600n + 1`.
#[derive(Debug, PartialEq)]
pub struct HgtTile {
    data: Vec<u8>,
    samples_per_side: u32,
}

impl HgtTile {
    /// Wraps a raw HGT byte buffer, inferring the raster shape from its
    /// length.
    ///
    /// # Errors
    ///
    /// Returns the unrecognized length when it matches neither SRTM1 nor
    /// SRTM3.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, usize> {
        let samples_per_side = match data.len() {
            SRTM3_FILE_LEN => 1201,
            SRTM1_FILE_LEN => 3601,
            other => return Err(other),
        };
        Ok(Self {
            data,
            samples_per_side,
        })
    }

    pub const fn samples_per_side(&self) -> u32 {
        self.samples_per_side
    }

    /// Raw sample at (row, col); row 0 is the north edge.
    ///
    /// # Panics
    ///
    /// Panics when the indices exceed the raster shape.
    pub fn raw_sample(&self, row: u32, col: u32) -> i16 {
        assert!(row < self.samples_per_side && col < self.samples_per_side);
        let index = (row as usize * self.samples_per_side as usize + col as usize) * 2;
        I16::<BigEndian>::read_from_bytes(&self.data[index..index + 2])
            .expect("slice is exactly two bytes")
            .get()
    }

    /// Sample at (row, col), or `None` for a void.
    pub fn sample(&self, row: u32, col: u32) -> Option<i16> {
        match self.raw_sample(row, col) {
            VOID_SAMPLE => None,
            value => Some(value),
        }
    }

    /// Bilinear interpolation at fractional raster coordinates.
    ///
    /// `row` and `col` must lie in `[0, samples_per_side - 1]`. When some
    /// of the four surrounding samples are void the lookup degrades to the
    /// nearest sample; if that nearest sample is itself void the result is
    /// `None`.
    pub fn interpolate(&self, row: f64, col: f64) -> Option<f64> {
        let max_index = f64::from(self.samples_per_side - 1);
        let row = row.clamp(0.0, max_index);
        let col = col.clamp(0.0, max_index);

        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let r0 = (row.floor() as u32).min(self.samples_per_side - 2);
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let c0 = (col.floor() as u32).min(self.samples_per_side - 2);
        let (r1, c1) = (r0 + 1, c0 + 1);

        let corners = [
            self.sample(r0, c0),
            self.sample(r0, c1),
            self.sample(r1, c0),
            self.sample(r1, c1),
        ];

        let dr = row - f64::from(r0);
        let dc = col - f64::from(c0);

        if let [Some(nw), Some(ne), Some(sw), Some(se)] = corners {
            let north = f64::from(nw) * (1.0 - dc) + f64::from(ne) * dc;
            let south = f64::from(sw) * (1.0 - dc) + f64::from(se) * dc;
            return Some(north * (1.0 - dr) + south * dr);
        }

        // Degraded path: nearest neighbour, which may itself be void.
        let nearest_row = if dr < 0.5 { r0 } else { r1 };
        let nearest_col = if dc < 0.5 { c0 } else { c1 };
        self.sample(nearest_row, nearest_col).map(f64::from)
    }
}
