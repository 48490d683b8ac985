use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::MemberId;
use crate::notify::NotifyConfig;
use crate::tier::TierTable;

#[derive(Clone, Debug)]
pub struct BattleConfig {
    /// Journal file; `None` keeps everything in memory only.
    pub journal_path: Option<PathBuf>,
    pub tiers: TierTable,
    /// Attempts per member per game day.
    pub daily_attempts: usize,
    /// How long an attacking claim is protected from being cancelled by
    /// other members.
    pub claim_grace: Duration,
    pub update_wait: Duration,
    pub report_cache_ttl: Duration,
    pub report_cache_max: usize,
    pub super_admins: Vec<MemberId>,
    pub notify: NotifyConfig,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            tiers: TierTable::default(),
            daily_attempts: 3,
            claim_grace: Duration::from_secs(180),
            update_wait: Duration::from_secs(30),
            report_cache_ttl: Duration::from_secs(10),
            report_cache_max: 64,
            super_admins: Vec::new(),
            notify: NotifyConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl BattleConfig {
    /// Read `CLANBATTLE_*` variables; anything unset or unparsable keeps its
    /// default. Only an unreadable tier file is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();

        let journal_path: Option<PathBuf> = std::env::var("CLANBATTLE_JOURNAL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let tiers = match std::env::var("CLANBATTLE_TIERS") {
            Ok(p) if !p.trim().is_empty() => TierTable::load(Path::new(p.trim()))?,
            _ => d.tiers,
        };

        let daily_attempts: usize = env_parse("CLANBATTLE_DAILY_ATTEMPTS")
            .unwrap_or(d.daily_attempts)
            .max(1);
        let claim_grace = env_parse("CLANBATTLE_CLAIM_GRACE_S")
            .map(Duration::from_secs)
            .unwrap_or(d.claim_grace);
        let update_wait = env_parse("CLANBATTLE_UPDATE_WAIT_S")
            .map(Duration::from_secs)
            .unwrap_or(d.update_wait);
        let report_cache_ttl = env_parse("CLANBATTLE_REPORT_CACHE_TTL_S")
            .map(Duration::from_secs)
            .unwrap_or(d.report_cache_ttl);
        let report_cache_max: usize = env_parse("CLANBATTLE_REPORT_CACHE_MAX")
            .unwrap_or(d.report_cache_max);

        let super_admins: Vec<MemberId> = std::env::var("CLANBATTLE_SUPER_ADMINS")
            .ok()
            .map(|v| {
                v.split(',')
                    .filter_map(|x| x.trim().parse().ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let notify = NotifyConfig {
            enabled: std::env::var("CLANBATTLE_NOTIFY_ENABLED")
                .ok()
                .map(|v| !matches!(v.trim(), "0" | "false" | "no" | "off"))
                .unwrap_or(d.notify.enabled),
            channel_capacity: env_parse("CLANBATTLE_NOTIFY_CAPACITY")
                .unwrap_or(d.notify.channel_capacity),
        };

        Ok(Self {
            journal_path,
            tiers,
            daily_attempts,
            claim_grace,
            update_wait,
            report_cache_ttl,
            report_cache_max,
            super_admins,
            notify,
        })
    }
}
