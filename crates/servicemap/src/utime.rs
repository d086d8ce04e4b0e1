use std::fmt;

use chrono::{DateTime, Utc};

use crate::codec::{Decode, DecodeResult, Decoder, Encode, Encoder};

const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%z";

/// Wall-clock timestamp as carried on the wire: seconds and nanoseconds
/// since the Unix epoch, both 32-bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UTime {
    pub sec: u32,
    pub nsec: u32,
}

impl UTime {
    pub const fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Clamps instants outside the 32-bit seconds range to its bounds.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let sec = dt.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        Self {
            sec,
            nsec: dt.timestamp_subsec_nanos().min(999_999_999),
        }
    }

    /// `None` when `nsec` is out of range, which only a corrupt peer sends.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.sec), self.nsec)
    }
}

impl fmt::Display for UTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format(STAMP_FORMAT)),
            None => write!(f, "{}.{:09}", self.sec, self.nsec),
        }
    }
}

impl Encode for UTime {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u32(self.sec);
        enc.put_u32(self.nsec);
    }
}

impl Decode for UTime {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let sec = dec.get_u32()?;
        let nsec = dec.get_u32()?;
        Ok(Self { sec, nsec })
    }
}
