//! Utilities.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicI32, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Smallest memory quantity the simulator accepts (2^6).
pub const MIN_MEMORY: usize = 1 << 6;
/// Largest memory quantity the simulator accepts (2^16).
pub const MAX_MEMORY: usize = 1 << 16;

/// Returns true if `value` is a power of two within `[min, max]`.
pub fn is_pow2_within(value: u64, min: u64, max: u64) -> bool {
    value.is_power_of_two() && (min..=max).contains(&value)
}

/// Every power of two within `[min, max]`, ascending.
pub fn pow2_range(min: usize, max: usize) -> impl Iterator<Item = usize> {
    (0..usize::BITS)
        .map(|shift| 1usize << shift)
        .skip_while(move |v| *v < min)
        .take_while(move |v| *v <= max)
}

/// UTC offset, in seconds, of timestamps taken with [`Timestamp::now`].
static LOCAL_OFFSET: AtomicI32 = AtomicI32::new(0);

/// Sets the UTC offset, in seconds, of timestamps taken from now on.
pub fn set_local_offset(secs: i32) {
    LOCAL_OFFSET.store(secs, Ordering::Relaxed);
}

/// Sets the UTC offset of new timestamps to the one of the system time zone.
///
/// The zone is named by `TZ`, or else is `/etc/localtime`. Without a
/// readable zone file, timestamps stay in UTC.
pub fn use_system_offset() {
    let path = match std::env::var("TZ") {
        Ok(tz) if !tz.is_empty() => {
            PathBuf::from("/usr/share/zoneinfo").join(tz.trim_start_matches(':'))
        }
        _ => PathBuf::from("/etc/localtime"),
    };
    let offset = std::fs::read(&path)
        .ok()
        .and_then(|data| tzif_offset(&data, Timestamp::now().as_unix() as i64));
    match offset {
        Some(offset) => set_local_offset(offset),
        None => log::debug!("Clock: no time zone at {}, using UTC", path.display()),
    }
}

/// The `N` bytes at `at`.
fn be<const N: usize>(data: &[u8], at: usize) -> Option<[u8; N]> {
    data.get(at..at + N)?.try_into().ok()
}

/// UTC offset at `unix` in a compiled zone file (RFC 8536).
///
/// After the last transition, the offset of that transition stays in
/// effect.
fn tzif_offset(data: &[u8], unix: i64) -> Option<i32> {
    // ttisut, ttisstd, leap, time, type and char counts.
    let counts = |at: usize| -> Option<[usize; 6]> {
        if data.get(at..at + 4)? != b"TZif" {
            return None;
        }
        let mut counts = [0; 6];
        for (i, count) in counts.iter_mut().enumerate() {
            *count = u32::from_be_bytes(be(data, at + 20 + i * 4)?) as usize;
        }
        Some(counts)
    };
    let mut block = counts(0)?;
    let (mut header, mut width) = (0, 4);
    if *data.get(4)? >= b'2' {
        // Version 2 and later repeat the data with 64-bit transition times.
        let [isut, isstd, leap, time, types, chars] = block;
        header = 44 + time * 5 + types * 6 + chars + leap * 8 + isstd + isut;
        block = counts(header)?;
        width = 8;
    }
    let [_, _, _, time, _, _] = block;
    let times = header + 44;
    let indices = times + time * width;
    let infos = indices + time;

    let transition = |i: usize| -> Option<i64> {
        let at = times + i * width;
        match width {
            8 => Some(i64::from_be_bytes(be(data, at)?)),
            _ => Some(i64::from(i32::from_be_bytes(be(data, at)?))),
        }
    };
    let mut kind = 0;
    for i in 0..time {
        if transition(i)? > unix {
            break;
        }
        kind = usize::from(*data.get(indices + i)?);
    }
    Some(i32::from_be_bytes(be(data, infos + kind * 6)?))
}

/// Wall-clock time in seconds since the Unix epoch, with the UTC offset it
/// is rendered in.
///
/// [`Timestamp::now`] renders in the offset set by [`set_local_offset`] or
/// [`use_system_offset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    secs: u64,
    offset: i32,
}

impl Timestamp {
    /// The current time.
    pub fn now() -> Self {
        Self {
            secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            offset: LOCAL_OFFSET.load(Ordering::Relaxed),
        }
    }

    /// Time at `secs` seconds after the Unix epoch, rendered in UTC.
    pub const fn from_unix(secs: u64) -> Self {
        Self { secs, offset: 0 }
    }

    /// The same instant, rendered `offset` seconds ahead of UTC.
    pub const fn with_offset(self, offset: i32) -> Self {
        Self {
            secs: self.secs,
            offset,
        }
    }

    /// Seconds since the Unix epoch.
    pub const fn as_unix(&self) -> u64 {
        self.secs
    }

    /// Seconds since the Unix epoch, shifted to the rendering offset.
    fn local(&self) -> i64 {
        self.secs as i64 + i64::from(self.offset)
    }

    fn civil(&self) -> (i64, u32, u32) {
        // Days to (year, month, day) in the proleptic Gregorian calendar.
        let z = self.local().div_euclid(86_400) + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
        let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
        let year = yoe + era * 400 + i64::from(month <= 2);
        (year, month, day)
    }

    fn hms(&self) -> (i64, i64, i64) {
        let secs = self.local().rem_euclid(86_400);
        (secs / 3_600, secs % 3_600 / 60, secs % 60)
    }

    /// Time of day as `HH:MM:SS`.
    pub fn clock(&self) -> String {
        let (h, m, s) = self.hms();
        format!("{h:02}:{m:02}:{s:02}")
    }
}

/// `MM/DD/YYYY, hh:mm:ss AM`.
impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (year, month, day) = self.civil();
        let (h, m, s) = self.hms();
        let meridiem = if h < 12 { "AM" } else { "PM" };
        let h12 = match h % 12 {
            0 => 12,
            h => h,
        };
        write!(
            f,
            "{month:02}/{day:02}/{year}, {h12:02}:{m:02}:{s:02} {meridiem}"
        )
    }
}
