//! Packed little-endian wire records.
//!
//! Guest modules expose fixed buffers in linear memory (`get_config_buffer`,
//! `get_pose_buffer`); the host reads and writes packed records there. The
//! encoding is position-exact and little-endian on every platform, matching
//! the struct formats `<ffffi>` ([`Config`]) and `<fff>` ([`Pose`]).

use crate::{Config, Pose};

/// Errors from packed record encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The buffer is smaller than the record layout requires.
    #[error("packed record needs {expected} bytes, buffer has {got}")]
    Truncated { expected: usize, got: usize },
}

/// A record with a fixed packed little-endian layout.
pub trait WireRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decode a record from the first `SIZE` bytes of `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self, WireError>;

    /// Encode the record into the first `SIZE` bytes of `out`.
    fn encode(&self, out: &mut [u8]) -> Result<(), WireError>;
}

fn check_len(len: usize, expected: usize) -> Result<(), WireError> {
    if len < expected {
        return Err(WireError::Truncated { expected, got: len });
    }
    Ok(())
}

// Callers must have validated the buffer length; offsets are in range.
fn f32_at(bytes: &[u8], off: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[off..off + 4]);
    f32::from_le_bytes(raw)
}

fn i32_at(bytes: &[u8], off: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[off..off + 4]);
    i32::from_le_bytes(raw)
}

impl WireRecord for Config {
    const SIZE: usize = 20;

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        check_len(bytes.len(), Self::SIZE)?;
        Ok(Self {
            ship_max_turn_rate: f32_at(bytes, 0),
            ship_max_velocity: f32_at(bytes, 4),
            ship_hit_radius: f32_at(bytes, 8),
            shot_velocity: f32_at(bytes, 12),
            shot_lifetime: i32_at(bytes, 16),
        })
    }

    fn encode(&self, out: &mut [u8]) -> Result<(), WireError> {
        check_len(out.len(), Self::SIZE)?;
        out[0..4].copy_from_slice(&self.ship_max_turn_rate.to_le_bytes());
        out[4..8].copy_from_slice(&self.ship_max_velocity.to_le_bytes());
        out[8..12].copy_from_slice(&self.ship_hit_radius.to_le_bytes());
        out[12..16].copy_from_slice(&self.shot_velocity.to_le_bytes());
        out[16..20].copy_from_slice(&self.shot_lifetime.to_le_bytes());
        Ok(())
    }
}

impl WireRecord for Pose {
    const SIZE: usize = 12;

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        check_len(bytes.len(), Self::SIZE)?;
        Ok(Self {
            x: f32_at(bytes, 0),
            y: f32_at(bytes, 4),
            heading: f32_at(bytes, 8),
        })
    }

    fn encode(&self, out: &mut [u8]) -> Result<(), WireError> {
        check_len(out.len(), Self::SIZE)?;
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
        out[8..12].copy_from_slice(&self.heading.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_layout_is_ffffi_little_endian() {
        let cfg = Config {
            ship_max_turn_rate: 1.0,
            ship_max_velocity: 2.0,
            ship_hit_radius: 3.0,
            shot_velocity: 4.0,
            shot_lifetime: 60,
        };

        let mut buf = [0u8; 20];
        cfg.encode(&mut buf).unwrap();

        let mut expected = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        expected.extend_from_slice(&60i32.to_le_bytes());
        assert_eq!(&buf[..], &expected[..]);

        assert_eq!(Config::decode(&buf).unwrap(), cfg);
    }

    #[test]
    fn pose_layout_is_fff_little_endian() {
        let pose = Pose {
            x: 0.25,
            y: 0.75,
            heading: 180.0,
        };

        let mut buf = [0u8; 12];
        pose.encode(&mut buf).unwrap();
        assert_eq!(&buf[0..4], &0.25f32.to_le_bytes());
        assert_eq!(&buf[4..8], &0.75f32.to_le_bytes());
        assert_eq!(&buf[8..12], &180.0f32.to_le_bytes());

        assert_eq!(Pose::decode(&buf).unwrap(), pose);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = Pose::decode(&[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            WireError::Truncated {
                expected: 12,
                got: 8
            }
        ));

        let pose = Pose {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
        };
        let mut short = [0u8; 4];
        assert!(pose.encode(&mut short).is_err());
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut buf = vec![0u8; 32];
        let cfg = Config {
            ship_max_turn_rate: 5.5,
            ship_max_velocity: 0.1,
            ship_hit_radius: 0.02,
            shot_velocity: 0.04,
            shot_lifetime: 12,
        };
        cfg.encode(&mut buf).unwrap();
        assert_eq!(Config::decode(&buf).unwrap(), cfg);
    }
}
