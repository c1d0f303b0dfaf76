//! Wire addressing

use smallvec::SmallVec;
use std::fmt;

/// Type-safe identifier for a wire of the circuit register
///
/// # Example
/// ```
/// use qtape_core::Wire;
///
/// let w0 = Wire::new(0);
/// let w1 = Wire::new(1);
/// assert!(w0 < w1);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Wire(usize);

impl Wire {
    /// Create a new wire identifier
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the underlying index
    #[inline]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

impl From<usize> for Wire {
    #[inline]
    fn from(index: usize) -> Self {
        Self::new(index)
    }
}

impl From<Wire> for usize {
    #[inline]
    fn from(wire: Wire) -> Self {
        wire.index()
    }
}

/// Wires targeted by a single operation or measurement; most act on 1-2 wires
pub type Wires = SmallVec<[Wire; 2]>;

/// Build a wire list from raw indices
pub fn wires(indices: &[usize]) -> Wires {
    indices.iter().copied().map(Wire::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_display() {
        assert_eq!(format!("{}", Wire::new(3)), "w3");
    }

    #[test]
    fn test_wire_conversion() {
        let w: Wire = 4.into();
        let idx: usize = w.into();
        assert_eq!(idx, 4);
    }

    #[test]
    fn test_wires_helper() {
        let ws = wires(&[2, 0]);
        assert_eq!(ws.len(), 2);
        assert_eq!(ws[0], Wire::new(2));
        assert_eq!(ws[1], Wire::new(0));
    }
}
