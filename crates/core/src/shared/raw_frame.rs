/// Number of bytes in one 4:2:0 frame: a full-size luma plane followed by two
/// quarter-size chroma planes.
pub fn raw_frame_len(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * 3 / 2
}

/// An uncompressed 4:2:0 planar (I420) frame.
///
/// Colour conversion and rotation happen before frames reach this type; the
/// store and pipeline treat the pixel bytes as opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// A frame filled with a single value, mostly useful for tests and synthetic input.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::new(vec![value; raw_frame_len(width, height)], width, height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn expected_len(&self) -> usize {
        raw_frame_len(self.width, self.height)
    }

    /// True when the byte length matches the declared dimensions.
    pub fn is_well_sized(&self) -> bool {
        self.data.len() == self.expected_len()
    }

    pub fn luma(&self) -> &[u8] {
        let y_len = (self.width as usize) * (self.height as usize);
        &self.data[..y_len.min(self.data.len())]
    }
}
