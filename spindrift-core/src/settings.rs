//! Runtime settings applied to a live session.
//!
//! Settings are a fixed, enumerated set: every recognized name lives in
//! a process-wide immutable table, and setting an unrecognized name is
//! an error rather than a silent no-op, so a typo in a persisted
//! setting list fails loudly at load time.

use std::time::Duration;

use crate::alert::AlertCategory;
use crate::torrent::TorrentError;

/// Subscribed alert category mask, as raw bits.
pub const ALERT_MASK: &str = "alert_mask";
/// Alert queue capacity; takes effect at the next engine spawn.
pub const ALERT_QUEUE_SIZE: &str = "alert_queue_size";
/// Interval between periodic stats snapshots, in milliseconds.
pub const STATS_INTERVAL_MS: &str = "stats_interval_ms";

struct SettingDef {
    name: &'static str,
    default: i64,
}

// The full set of recognized settings. Immutable after process start.
const SETTINGS: &[SettingDef] = &[
    SettingDef {
        name: ALERT_MASK,
        default: 0b11, // status | error
    },
    SettingDef {
        name: ALERT_QUEUE_SIZE,
        default: 1000,
    },
    SettingDef {
        name: STATS_INTERVAL_MS,
        default: 5000,
    },
];

fn lookup(name: &str) -> Option<&'static SettingDef> {
    SETTINGS.iter().find(|def| def.name == name)
}

/// The built-in default for a recognized setting name.
///
/// # Errors
/// - `TorrentError::UnknownSetting` - `name` is not a recognized setting
pub fn default_int(name: &str) -> Result<i64, TorrentError> {
    lookup(name)
        .map(|def| def.default)
        .ok_or_else(|| TorrentError::UnknownSetting {
            name: name.to_string(),
        })
}

/// A batch of setting overrides to apply to a running session.
///
/// Only names present in the pack are touched; everything else keeps
/// its current value.
#[derive(Debug, Clone, Default)]
pub struct SettingsPack {
    values: Vec<(&'static str, i64)>,
}

impl SettingsPack {
    /// Empty pack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an integer setting by name.
    ///
    /// # Errors
    /// - `TorrentError::UnknownSetting` - `name` is not a recognized
    ///   setting
    pub fn set_int(&mut self, name: &str, value: i64) -> Result<(), TorrentError> {
        let def = lookup(name).ok_or_else(|| TorrentError::UnknownSetting {
            name: name.to_string(),
        })?;

        match self.values.iter_mut().find(|(n, _)| *n == def.name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((def.name, value)),
        }
        Ok(())
    }

    /// Reads back a value set in this pack, if any.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// True when the pack carries no overrides.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The alert mask carried by this pack, if set.
    pub fn alert_mask(&self) -> Option<AlertCategory> {
        self.get_int(ALERT_MASK)
            .map(|bits| AlertCategory::from_bits(bits as u32))
    }

    /// The stats interval carried by this pack, if set to a usable
    /// (positive) value.
    pub fn stats_interval(&self) -> Option<Duration> {
        self.get_int(STATS_INTERVAL_MS)
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// The queue capacity carried by this pack, if set to a usable
    /// (positive) value.
    pub fn alert_queue_size(&self) -> Option<usize> {
        self.get_int(ALERT_QUEUE_SIZE)
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_setting_rejected() {
        let mut pack = SettingsPack::new();
        let err = pack.set_int("unexpected-key-name", 1).unwrap_err();
        assert!(matches!(err, TorrentError::UnknownSetting { .. }));
        assert!(pack.is_empty());
    }

    #[test]
    fn test_set_and_read_back() {
        let mut pack = SettingsPack::new();
        pack.set_int(ALERT_MASK, AlertCategory::all().bits() as i64)
            .unwrap();
        pack.set_int(STATS_INTERVAL_MS, 250).unwrap();

        assert_eq!(pack.alert_mask(), Some(AlertCategory::all()));
        assert_eq!(pack.stats_interval(), Some(Duration::from_millis(250)));
        assert_eq!(pack.alert_queue_size(), None);
    }

    #[test]
    fn test_later_set_overwrites() {
        let mut pack = SettingsPack::new();
        pack.set_int(ALERT_QUEUE_SIZE, 10).unwrap();
        pack.set_int(ALERT_QUEUE_SIZE, 20).unwrap();
        assert_eq!(pack.alert_queue_size(), Some(20));
    }

    #[test]
    fn test_unusable_values_filtered_by_getters() {
        let mut pack = SettingsPack::new();
        pack.set_int(ALERT_QUEUE_SIZE, -5).unwrap();
        pack.set_int(STATS_INTERVAL_MS, 0).unwrap();
        assert_eq!(pack.alert_queue_size(), None);
        assert_eq!(pack.stats_interval(), None);
    }

    #[test]
    fn test_defaults_match_table() {
        assert_eq!(default_int(ALERT_QUEUE_SIZE).unwrap(), 1000);
        assert!(default_int("nope").is_err());
    }
}
