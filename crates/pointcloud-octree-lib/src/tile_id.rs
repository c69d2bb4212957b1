//! Quadrant-path identifiers used as store keys

use crate::{OctreeError, Result};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Number of children per node
pub const QUADRANTS: u8 = 4;

/// Path from the root to a node, one quadrant index (0..=3) per level
///
/// The empty path is the root. The byte encoding is the path itself, so the
/// lexicographic order of keys places every node before all of its descendants.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId(SmallVec<[u8; 32]>);

impl TileId {
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Build an id from quadrant indices, rejecting values outside 0..=3
    pub fn from_quadrants(quadrants: &[u8]) -> Result<Self> {
        if let Some(invalid) = quadrants.iter().find(|&&q| q >= QUADRANTS) {
            return Err(OctreeError::InvalidTileId(format!(
                "quadrant index {invalid} out of range"
            )));
        }
        Ok(Self(SmallVec::from_slice(quadrants)))
    }

    /// Raw key bytes as stored in the tile store
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Depth in the tree (0 = root)
    #[inline]
    pub fn level(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Id of the quadrant `index` below this node
    pub fn child(&self, index: u8) -> TileId {
        debug_assert!(index < QUADRANTS);
        let mut path = self.0.clone();
        path.push(index);
        TileId(path)
    }

    /// Id with the last quadrant stripped, `None` for the root
    pub fn parent(&self) -> Option<TileId> {
        let (_, rest) = self.0.split_last()?;
        Some(TileId(SmallVec::from_slice(rest)))
    }

    /// Quadrant index of this node inside its parent
    pub fn last_quadrant(&self) -> Option<u8> {
        self.0.last().copied()
    }

    /// True if `self` is a prefix of `other` (a node is its own ancestor-or-self)
    #[inline]
    pub fn is_ancestor_or_self_of(&self, other: &TileId) -> bool {
        other.0.starts_with(&self.0)
    }

    /// True if `self` is a strict prefix of `other`
    #[inline]
    pub fn is_ancestor_of(&self, other: &TileId) -> bool {
        self.0.len() < other.0.len() && self.is_ancestor_or_self_of(other)
    }

    /// This id followed by each ancestor up to and including the root
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = TileId> + '_ {
        (0..=self.0.len())
            .rev()
            .map(|len| TileId(SmallVec::from_slice(&self.0[..len])))
    }

    /// Quadrant indices from the root down
    #[inline]
    pub fn quadrants(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for TileId {
    type Error = OctreeError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        TileId::from_quadrants(bytes)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for quadrant in self.0.iter() {
            write!(f, "{quadrant}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileId(\"{self}\")")
    }
}

/// Parses the digit form produced by `Display`, e.g. `"0213"`; `""` is the root
impl FromStr for TileId {
    type Err = OctreeError;

    fn from_str(s: &str) -> Result<Self> {
        let quadrants = s
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .filter(|&d| d < QUADRANTS as u32)
                    .map(|d| d as u8)
                    .ok_or_else(|| OctreeError::InvalidTileId(format!("invalid quadrant '{c}'")))
            })
            .collect::<Result<Vec<u8>>>()?;
        Ok(TileId(SmallVec::from_vec(quadrants)))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TileId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
