//! Binary layouts of the two per-tile store entries
//!
//! Node entry (63 bytes, big-endian):
//!
//! | field        | type |
//! |--------------|------|
//! | version      | u8   |
//! | subversion   | u8   |
//! | lower lat    | f64  |
//! | lower lon    | f64  |
//! | upper lat    | f64  |
//! | upper lon    | f64  |
//! | points count | i32  |
//! | average lat  | f64  |
//! | average lon  | f64  |
//! | average h    | f64  |
//! | format id    | u8   |
//!
//! Node data entry: `points count` triples of f32 `(dlat, dlon, dheight)`, each the
//! difference between the point and the node's average point. Angles in radians.
//! Storing single-precision deltas over a double-precision origin is lossy.

use crate::geometry::{Geodetic3D, Sector};
use crate::tile_id::TileId;
use crate::{OctreeError, Result};
use bytes::{Buf, BufMut};

pub const VERSION: u8 = 1;
pub const SUBVERSION: u8 = 0;

/// Size in bytes of an encoded node entry
pub const NODE_ENTRY_SIZE: usize = 1 + 1 + 4 * 8 + 4 + 3 * 8 + 1;

/// Size in bytes of one encoded point
pub const POINT_SIZE: usize = 3 * 4;

/// Payload encoding of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// f32 deltas of latitude, longitude and height
    LatLonHeight,
    /// Interior node whose points were moved to its children; empty payload
    Subdivided,
}

impl Format {
    pub const fn id(self) -> u8 {
        match self {
            Format::LatLonHeight => 1,
            Format::Subdivided => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Format> {
        match id {
            1 => Some(Format::LatLonHeight),
            2 => Some(Format::Subdivided),
            _ => None,
        }
    }
}

/// Decoded contents of a node entry
#[derive(Clone, Debug, PartialEq)]
pub struct NodeEntry {
    pub sector: Sector,
    pub points_count: u32,
    pub average_point: Geodetic3D,
    pub format: Format,
}

pub fn encode_node_entry(id: &TileId, entry: &NodeEntry) -> Result<Vec<u8>> {
    let points_count = i32::try_from(entry.points_count).map_err(|_| {
        OctreeError::CapacityExceeded {
            id: id.clone(),
            count: entry.points_count as usize,
            max: i32::MAX as usize,
        }
    })?;

    let lower = entry.sector.lower();
    let upper = entry.sector.upper();

    let mut buffer = Vec::with_capacity(NODE_ENTRY_SIZE);
    buffer.put_u8(VERSION);
    buffer.put_u8(SUBVERSION);
    buffer.put_f64(lower.latitude.radians());
    buffer.put_f64(lower.longitude.radians());
    buffer.put_f64(upper.latitude.radians());
    buffer.put_f64(upper.longitude.radians());
    buffer.put_i32(points_count);
    buffer.put_f64(entry.average_point.latitude.radians());
    buffer.put_f64(entry.average_point.longitude.radians());
    buffer.put_f64(entry.average_point.height);
    buffer.put_u8(entry.format.id());

    debug_assert_eq!(buffer.len(), NODE_ENTRY_SIZE);
    Ok(buffer)
}

pub fn decode_node_entry(id: &TileId, data: &[u8]) -> Result<NodeEntry> {
    if data.len() != NODE_ENTRY_SIZE {
        return Err(corrupt(
            id,
            format!(
                "node entry is {} bytes, expected {NODE_ENTRY_SIZE}",
                data.len()
            ),
        ));
    }

    let mut buffer = data;

    let version = buffer.get_u8();
    if version != VERSION {
        return Err(corrupt(id, format!("invalid version={version}")));
    }
    let subversion = buffer.get_u8();
    if subversion != SUBVERSION {
        return Err(corrupt(id, format!("invalid subversion={subversion}")));
    }

    let lower_latitude = buffer.get_f64();
    let lower_longitude = buffer.get_f64();
    let upper_latitude = buffer.get_f64();
    let upper_longitude = buffer.get_f64();
    let sector = Sector::from_radians(
        lower_latitude,
        lower_longitude,
        upper_latitude,
        upper_longitude,
    );

    let points_count = buffer.get_i32();
    let points_count = u32::try_from(points_count)
        .map_err(|_| corrupt(id, format!("negative points count {points_count}")))?;

    let average_latitude = buffer.get_f64();
    let average_longitude = buffer.get_f64();
    let average_height = buffer.get_f64();
    let average_point =
        Geodetic3D::from_radians(average_latitude, average_longitude, average_height);

    let format_id = buffer.get_u8();
    let format = Format::from_id(format_id)
        .ok_or_else(|| corrupt(id, format!("invalid format id={format_id}")))?;

    if format == Format::Subdivided && points_count != 0 {
        return Err(corrupt(
            id,
            format!("subdivided node claims {points_count} points"),
        ));
    }

    Ok(NodeEntry {
        sector,
        points_count,
        average_point,
        format,
    })
}

/// Encode points as f32 deltas from `average`
pub fn encode_points(average: &Geodetic3D, points: &[Geodetic3D]) -> Vec<u8> {
    let average_latitude = average.latitude.radians();
    let average_longitude = average.longitude.radians();
    let average_height = average.height;

    let mut buffer = Vec::with_capacity(points.len() * POINT_SIZE);
    for point in points {
        buffer.put_f32((point.latitude.radians() - average_latitude) as f32);
        buffer.put_f32((point.longitude.radians() - average_longitude) as f32);
        buffer.put_f32((point.height - average_height) as f32);
    }
    buffer
}

/// Decode a node data entry, checking it holds exactly `points_count` points
pub fn decode_points(
    id: &TileId,
    average: &Geodetic3D,
    points_count: u32,
    data: &[u8],
) -> Result<Vec<Geodetic3D>> {
    let expected = points_count as usize;
    if data.len() % POINT_SIZE != 0 {
        return Err(corrupt(
            id,
            format!("node data length {} is not a multiple of {POINT_SIZE}", data.len()),
        ));
    }
    let decoded = data.len() / POINT_SIZE;
    if decoded != expected {
        return Err(corrupt(
            id,
            format!("inconsistency in points count: stored {expected}, decoded {decoded}"),
        ));
    }

    let average_latitude = average.latitude.radians();
    let average_longitude = average.longitude.radians();
    let average_height = average.height;

    let mut buffer = data;
    let mut points = Vec::with_capacity(expected);
    while buffer.has_remaining() {
        let latitude = buffer.get_f32() as f64 + average_latitude;
        let longitude = buffer.get_f32() as f64 + average_longitude;
        let height = buffer.get_f32() as f64 + average_height;
        points.push(Geodetic3D::from_radians(latitude, longitude, height));
    }

    Ok(points)
}

fn corrupt(id: &TileId, reason: String) -> OctreeError {
    OctreeError::CorruptStorage {
        id: id.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> NodeEntry {
        NodeEntry {
            sector: Sector::from_degrees(40.0, -4.0, 41.0, -3.0),
            points_count: 3,
            average_point: Geodetic3D::from_degrees(40.5, -3.5, 650.25),
            format: Format::LatLonHeight,
        }
    }

    #[test]
    fn test_node_entry_size() {
        let id: TileId = "0123".parse().unwrap();
        let encoded = encode_node_entry(&id, &sample_entry()).unwrap();
        assert_eq!(encoded.len(), NODE_ENTRY_SIZE);
        assert_eq!(NODE_ENTRY_SIZE, 63);
        assert_eq!(encoded[0], VERSION);
        assert_eq!(encoded[1], SUBVERSION);
        assert_eq!(encoded[62], Format::LatLonHeight.id());
    }

    #[test]
    fn test_node_entry_roundtrip_is_exact() {
        let id = TileId::root();
        let entry = sample_entry();
        let decoded = decode_node_entry(&id, &encode_node_entry(&id, &entry).unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_points_count_is_big_endian() {
        let id = TileId::root();
        let mut entry = sample_entry();
        entry.points_count = 0x0102_0304;
        let encoded = encode_node_entry(&id, &entry).unwrap();
        assert_eq!(&encoded[34..38], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_points_roundtrip_within_f32_precision() {
        let id = TileId::root();
        let average = Geodetic3D::from_degrees(40.5, -3.5, 650.0);
        let points = vec![
            Geodetic3D::from_degrees(40.1, -3.9, 600.5),
            Geodetic3D::from_degrees(40.9, -3.1, 700.125),
            Geodetic3D::from_degrees(40.5, -3.5, 650.0),
        ];

        let encoded = encode_points(&average, &points);
        assert_eq!(encoded.len(), points.len() * POINT_SIZE);

        let decoded = decode_points(&id, &average, 3, &encoded).unwrap();
        assert_eq!(decoded.len(), 3);
        for (original, restored) in points.iter().zip(decoded.iter()) {
            // f32 deltas: ~1e-9 rad (millimetres on the ground) and sub-millimetre heights
            assert!((original.latitude.radians() - restored.latitude.radians()).abs() < 1e-8);
            assert!((original.longitude.radians() - restored.longitude.radians()).abs() < 1e-8);
            assert!((original.height - restored.height).abs() < 1e-3);
        }
        // The average itself has a zero delta and survives exactly
        assert_eq!(decoded[2], average);
    }

    #[test]
    fn test_deltas_are_lossy() {
        let id = TileId::root();
        let average = Geodetic3D::from_radians(0.0, 0.0, 0.0);
        let point = Geodetic3D::from_radians(0.1 + 1e-12, 0.0, 1_000_000.001);
        let encoded = encode_points(&average, &[point]);
        let decoded = decode_points(&id, &average, 1, &encoded).unwrap();
        assert_ne!(decoded[0], point);
        assert!((decoded[0].height - point.height).abs() < 0.1);
    }

    #[test]
    fn test_invalid_version_rejected() {
        let id = TileId::root();
        let mut encoded = encode_node_entry(&id, &sample_entry()).unwrap();
        encoded[0] = 2;
        let err = decode_node_entry(&id, &encoded).unwrap_err();
        assert!(matches!(err, OctreeError::CorruptStorage { .. }));
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_invalid_subversion_rejected() {
        let id = TileId::root();
        let mut encoded = encode_node_entry(&id, &sample_entry()).unwrap();
        encoded[1] = 7;
        assert!(matches!(
            decode_node_entry(&id, &encoded),
            Err(OctreeError::CorruptStorage { .. })
        ));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let id = TileId::root();
        let mut encoded = encode_node_entry(&id, &sample_entry()).unwrap();
        encoded[NODE_ENTRY_SIZE - 1] = 42;
        assert!(matches!(
            decode_node_entry(&id, &encoded),
            Err(OctreeError::CorruptStorage { .. })
        ));
    }

    #[test]
    fn test_truncated_entry_rejected() {
        let id = TileId::root();
        let encoded = encode_node_entry(&id, &sample_entry()).unwrap();
        assert!(matches!(
            decode_node_entry(&id, &encoded[..40]),
            Err(OctreeError::CorruptStorage { .. })
        ));
    }

    #[test]
    fn test_negative_count_rejected() {
        let id = TileId::root();
        let mut encoded = encode_node_entry(&id, &sample_entry()).unwrap();
        encoded[34..38].copy_from_slice(&(-5i32).to_be_bytes());
        assert!(matches!(
            decode_node_entry(&id, &encoded),
            Err(OctreeError::CorruptStorage { .. })
        ));
    }

    #[test]
    fn test_points_count_mismatch_rejected() {
        let id = TileId::root();
        let average = Geodetic3D::default();
        let encoded = encode_points(&average, &[Geodetic3D::default(); 4]);
        let err = decode_points(&id, &average, 5, &encoded).unwrap_err();
        assert!(err.to_string().contains("inconsistency"));
        assert!(decode_points(&id, &average, 4, &encoded[..47]).is_err());
    }

    #[test]
    fn test_subdivided_with_points_rejected() {
        let id = TileId::root();
        let mut entry = sample_entry();
        entry.format = Format::Subdivided;
        let encoded = encode_node_entry(&id, &entry).unwrap();
        assert!(decode_node_entry(&id, &encoded).is_err());

        entry.points_count = 0;
        let encoded = encode_node_entry(&id, &entry).unwrap();
        assert_eq!(decode_node_entry(&id, &encoded).unwrap(), entry);
    }
}
