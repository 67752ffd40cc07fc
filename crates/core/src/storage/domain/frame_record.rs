use crate::shared::constants::RECORD_HEADER_LEN;

/// Encodes the scratch-record header: width then height, big-endian.
pub fn encode_header(width: u32, height: u32) -> [u8; RECORD_HEADER_LEN] {
    let mut header = [0u8; RECORD_HEADER_LEN];
    header[..4].copy_from_slice(&width.to_be_bytes());
    header[4..].copy_from_slice(&height.to_be_bytes());
    header
}

/// Splits a record into `(width, height, pixel_data)`.
///
/// Returns `None` when the record is shorter than its header.
pub fn decode_record(bytes: &[u8]) -> Option<(u32, u32, &[u8])> {
    if bytes.len() < RECORD_HEADER_LEN {
        return None;
    }
    let (header, pixels) = bytes.split_at(RECORD_HEADER_LEN);
    let width = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let height = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Some((width, height, pixels))
}
