// Date/time values as 100ns ticks since 0001-01-01T00:00:00.
use chrono::{FixedOffset, NaiveDateTime, TimeDelta, Utc};

use crate::error::{Error, Result};
use crate::inspector::{Channel, Inspect, Inspector};

pub const TICKS_PER_SECOND: i64 = 10_000_000;
pub const TICKS_PER_MINUTE: i64 = 60 * TICKS_PER_SECOND;
// Ticks at 1970-01-01T00:00:00.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DateTimeKind {
    #[default]
    Unspecified = 0,
    Utc = 1,
    Local = 2,
}

impl DateTimeKind {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(DateTimeKind::Unspecified),
            1 => Ok(DateTimeKind::Utc),
            2 => Ok(DateTimeKind::Local),
            other => Err(Error::malformed(format!("bad date kind {other}"))),
        }
    }
}

fn naive_to_ticks(dt: NaiveDateTime) -> Option<i64> {
    let utc = dt.and_utc();
    utc.timestamp()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(utc.timestamp_subsec_nanos()) / 100)?
        .checked_add(UNIX_EPOCH_TICKS)
}

fn ticks_to_naive(ticks: i64) -> Option<NaiveDateTime> {
    let rel = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = rel.div_euclid(TICKS_PER_SECOND);
    let nanos = (rel.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    chrono::DateTime::from_timestamp(secs, nanos).map(|d| d.naive_utc())
}

/// Tick count plus the kind that disambiguates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateTime {
    pub ticks: i64,
    pub kind: DateTimeKind,
}

impl DateTime {
    pub fn new(ticks: i64, kind: DateTimeKind) -> Self {
        Self { ticks, kind }
    }

    /// `None` when the instant is outside the tick range.
    pub fn from_naive(dt: NaiveDateTime, kind: DateTimeKind) -> Option<Self> {
        Some(Self::new(naive_to_ticks(dt)?, kind))
    }

    pub fn from_utc(dt: chrono::DateTime<Utc>) -> Option<Self> {
        Self::from_naive(dt.naive_utc(), DateTimeKind::Utc)
    }

    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        ticks_to_naive(self.ticks)
    }
}

impl Inspect for DateTime {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => {
                let ticks = r.read_i64()?;
                let kind = DateTimeKind::from_byte(r.read_u8()?)?;
                *self = DateTime { ticks, kind };
            }
            Channel::Write(w) => {
                w.write_i64(self.ticks)?;
                w.write_u8(self.kind as u8)?;
            }
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

/// Local clock ticks and the signed UTC offset in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateTimeOffset {
    pub ticks: i64,
    pub offset_minutes: i32,
}

impl DateTimeOffset {
    pub fn from_chrono(dt: chrono::DateTime<FixedOffset>) -> Option<Self> {
        Some(Self {
            ticks: naive_to_ticks(dt.naive_local())?,
            offset_minutes: dt.offset().local_minus_utc() / 60,
        })
    }

    pub fn to_chrono(&self) -> Option<chrono::DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.offset_minutes.checked_mul(60)?)?;
        ticks_to_naive(self.ticks)?
            .and_local_timezone(offset)
            .single()
    }

    /// Decoded offsets are unchecked, so the shift can leave the i64 range.
    pub fn utc_ticks(&self) -> Option<i64> {
        i64::from(self.offset_minutes)
            .checked_mul(TICKS_PER_MINUTE)
            .and_then(|shift| self.ticks.checked_sub(shift))
    }
}

impl Inspect for DateTimeOffset {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        match insp.channel() {
            Channel::Read(r) => {
                let ticks = r.read_i64()?;
                let offset_minutes = r.read_i32()?;
                *self = DateTimeOffset {
                    ticks,
                    offset_minutes,
                };
            }
            Channel::Write(w) => {
                w.write_i64(self.ticks)?;
                w.write_i32(self.offset_minutes)?;
            }
        }
        Ok(())
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TimeSpan(pub i64);

impl TimeSpan {
    pub fn from_delta(d: TimeDelta) -> Self {
        let ticks = d
            .num_seconds()
            .saturating_mul(TICKS_PER_SECOND)
            .saturating_add(i64::from(d.subsec_nanos()) / 100);
        TimeSpan(ticks)
    }

    pub fn to_delta(&self) -> Option<TimeDelta> {
        let secs = self.0.div_euclid(TICKS_PER_SECOND);
        let nanos = self.0.rem_euclid(TICKS_PER_SECOND) * 100;
        TimeDelta::try_seconds(secs)?.checked_add(&TimeDelta::nanoseconds(nanos))
    }
}

impl Inspect for TimeSpan {
    fn inspect(&mut self, insp: &mut Inspector<'_>) -> Result<()> {
        self.0.inspect(insp)
    }
    fn differs(&self, other: &Self) -> bool {
        self != other
    }
}
