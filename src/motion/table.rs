//! Velocity table slots and their temporary override.

use crate::error::MalformedResponseError;
use crate::protocol::{Reply, Variant};

/// The contents of one velocity table slot of an axis.
///
/// Velocities are in pulses per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VelocityTableEntry {
    /// The axis.
    pub ax_num: u32,
    /// The slot number.
    pub vel_no: i64,
    /// The start velocity.
    pub start_vel: i64,
    /// The maximum velocity.
    pub max_vel: i64,
    /// The acceleration time.
    pub acc_time: i64,
    /// Only reported by variants with separate deceleration times.
    pub dec_time: Option<i64>,
    /// The acceleration type code.
    pub acc_type: i64,
}

impl VelocityTableEntry {
    /// Read an entry from a `read_vel_tbl` reply.
    pub fn from_reply(reply: &Reply) -> Result<Self, MalformedResponseError> {
        Ok(VelocityTableEntry {
            ax_num: reply.parse("ax_num")?,
            vel_no: reply.parse("vel_no")?,
            start_vel: reply.parse("start_vel")?,
            max_vel: reply.parse("max_vel")?,
            acc_time: reply.parse("acc_time")?,
            dec_time: if reply.contains("dec_time") {
                Some(reply.parse("dec_time")?)
            } else {
                None
            },
            acc_type: reply.parse("acc_type")?,
        })
    }

    /// The `write_vel_tbl` arguments that store this entry.
    ///
    /// A missing deceleration time is written as the acceleration time.
    /// Arguments the variant does not take are dropped when encoding.
    pub fn to_args(&self) -> [(&'static str, i64); 7] {
        [
            ("ax_num", i64::from(self.ax_num)),
            ("vel_no", self.vel_no),
            ("start_vel", self.start_vel),
            ("max_vel", self.max_vel),
            ("acc_time", self.acc_time),
            ("dec_time", self.dec_time.unwrap_or(self.acc_time)),
            ("acc_type", self.acc_type),
        ]
    }

    /// The ratio between `max_vel` and this entry's maximum velocity.
    ///
    /// An entry with no maximum velocity scales by 1.
    pub fn scale_to(&self, max_vel: i64) -> f64 {
        if self.max_vel == 0 {
            1.0
        } else {
            max_vel as f64 / self.max_vel as f64
        }
    }
}

/// Scale an acceleration or deceleration time, never going below 1.
pub(crate) fn scale_time(time: i64, scale: f64) -> i64 {
    ((time as f64 * scale).trunc() as i64).max(1)
}

/// A velocity table slot that was temporarily overwritten.
///
/// Pass it to [`Controller::restore`](super::Controller::restore) to write
/// the original contents back. Restoring consumes it, so a slot is restored
/// at most once.
#[must_use = "the velocity table slot stays overwritten unless it is restored"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRestore {
    original: VelocityTableEntry,
    variant: Variant,
}

impl PendingRestore {
    pub(crate) fn new(original: VelocityTableEntry, variant: Variant) -> Self {
        PendingRestore { original, variant }
    }

    /// The axis the slot belongs to.
    pub fn axis(&self) -> u32 {
        self.original.ax_num
    }

    /// The slot number.
    pub fn vel_no(&self) -> i64 {
        self.original.vel_no
    }

    /// The slot's contents before it was overwritten.
    pub fn original(&self) -> &VelocityTableEntry {
        &self.original
    }

    /// The variant in use when the slot was read.
    pub fn variant(&self) -> Variant {
        self.variant
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{command::READ_VEL_TBL, Codec};

    #[test]
    fn entry_from_reply() {
        let reply = Codec::new(Variant::Aries)
            .decode("C RTB 1 3 5 10 100 200 2", READ_VEL_TBL)
            .unwrap();
        let entry = VelocityTableEntry::from_reply(&reply).unwrap();
        assert_eq!(entry.vel_no, 3);
        assert_eq!(entry.dec_time, Some(200));
        assert_eq!(entry.acc_type, 2);

        let reply = Codec::new(Variant::Default)
            .decode("C RTB 1 3 5 10 100 2", READ_VEL_TBL)
            .unwrap();
        let entry = VelocityTableEntry::from_reply(&reply).unwrap();
        assert_eq!(entry.dec_time, None);
        assert_eq!(entry.to_args()[5], ("dec_time", 100));
    }

    #[test]
    fn entry_from_bad_reply() {
        let reply = Codec::new(Variant::Default)
            .decode("C RTB 1 3 fast 10 100 2", READ_VEL_TBL)
            .unwrap();
        assert!(VelocityTableEntry::from_reply(&reply).is_err());
    }

    #[test]
    fn scaling() {
        let entry = VelocityTableEntry {
            ax_num: 1,
            vel_no: 3,
            start_vel: 5,
            max_vel: 10,
            acc_time: 100,
            dec_time: None,
            acc_type: 1,
        };
        assert_eq!(entry.scale_to(20), 2.0);
        assert_eq!(scale_time(entry.acc_time, entry.scale_to(20)), 200);
        assert_eq!(scale_time(1, entry.scale_to(1)), 1);
        assert_eq!(VelocityTableEntry { max_vel: 0, ..entry }.scale_to(20), 1.0);
    }
}
