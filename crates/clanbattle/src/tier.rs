use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BOSS_COUNT, Health};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameServer {
    Jp,
    Tw,
    Kr,
    Cn,
}

impl GameServer {
    pub const ALL: &'static [GameServer] = &[
        GameServer::Jp,
        GameServer::Tw,
        GameServer::Kr,
        GameServer::Cn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GameServer::Jp => "jp",
            GameServer::Tw => "tw",
            GameServer::Kr => "kr",
            GameServer::Cn => "cn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jp" | "ja" | "japan" => Some(GameServer::Jp),
            "tw" | "taiwan" => Some(GameServer::Tw),
            "kr" | "ko" | "korea" => Some(GameServer::Kr),
            "cn" | "china" => Some(GameServer::Cn),
            _ => None,
        }
    }

    /// Offset of server local time from UTC, in hours.
    pub fn utc_offset_hours(self) -> i64 {
        match self {
            GameServer::Jp | GameServer::Kr => 9,
            GameServer::Tw | GameServer::Cn => 8,
        }
    }
}

/// Phase index for a lap.
///
/// `tier_count` is the number of phases configured for the server; servers
/// with fewer phases stop climbing early.
pub fn phase(cycle: u32, tier_count: usize) -> usize {
    if cycle <= 3 {
        return 0;
    }
    if cycle <= 10 {
        return 1;
    }
    if cycle <= 30 || tier_count <= 3 {
        return 2;
    }
    if cycle <= 40 || tier_count <= 4 {
        return 3;
    }
    4
}

pub type TierRow = [Health; BOSS_COUNT];

/// Boss health pools per server and phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable {
    servers: HashMap<GameServer, Vec<TierRow>>,
}

/// Highest lap accepted from callers.
pub const MAX_CYCLE: u32 = 9_999;

const M: Health = 1_000_000;

const EARLY: TierRow = [6 * M, 8 * M, 10 * M, 12 * M, 15 * M];

impl Default for TierTable {
    fn default() -> Self {
        let jp = vec![
            EARLY,
            EARLY,
            [12 * M, 14 * M, 17 * M, 19 * M, 22 * M],
            [19 * M, 20 * M, 23 * M, 25 * M, 27 * M],
            [85 * M, 90 * M, 95 * M, 100 * M, 110 * M],
        ];
        let tw = jp[..4].to_vec();
        let cn = vec![EARLY, EARLY, [7 * M, 9 * M, 13 * M, 15 * M, 20 * M]];

        let mut servers = HashMap::new();
        servers.insert(GameServer::Jp, jp.clone());
        servers.insert(GameServer::Kr, jp);
        servers.insert(GameServer::Tw, tw);
        servers.insert(GameServer::Cn, cn);
        Self { servers }
    }
}

impl TierTable {
    pub fn new(servers: HashMap<GameServer, Vec<TierRow>>) -> anyhow::Result<Self> {
        for (server, rows) in &servers {
            if rows.is_empty() {
                anyhow::bail!("tier table for {} has no phases", server.as_str());
            }
            for (i, row) in rows.iter().enumerate() {
                if row.iter().any(|h| *h <= 0) {
                    anyhow::bail!(
                        "tier table for {} phase {} has a non-positive health",
                        server.as_str(),
                        i
                    );
                }
            }
        }
        Ok(Self { servers })
    }

    /// Load a JSON tier file; servers it does not mention keep the built-in
    /// values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read tier file {:?}: {e}", path))?;
        let parsed: HashMap<GameServer, Vec<TierRow>> = serde_json::from_str(&s)
            .map_err(|e| anyhow::anyhow!("failed to parse tier file {:?}: {e}", path))?;

        let mut servers = Self::default().servers;
        servers.extend(parsed);
        Self::new(servers)
    }

    pub fn tier_count(&self, server: GameServer) -> usize {
        self.servers.get(&server).map(|v| v.len()).unwrap_or(0)
    }

    pub fn phase_of(&self, server: GameServer, cycle: u32) -> usize {
        phase(cycle, self.tier_count(server))
    }

    /// Health row for a phase, clamped to the last configured phase.
    pub fn row(&self, server: GameServer, phase: usize) -> TierRow {
        match self.servers.get(&server) {
            Some(rows) if !rows.is_empty() => rows[phase.min(rows.len() - 1)],
            _ => EARLY,
        }
    }

    pub fn row_for_cycle(&self, server: GameServer, cycle: u32) -> TierRow {
        self.row(server, self.phase_of(server, cycle))
    }

    /// True when the lap after `cycle` is in a different phase.
    pub fn is_phase_changing(&self, server: GameServer, cycle: u32) -> bool {
        self.phase_of(server, cycle) != self.phase_of(server, cycle.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_brackets() {
        assert_eq!(phase(1, 5), 0);
        assert_eq!(phase(3, 5), 0);
        assert_eq!(phase(4, 5), 1);
        assert_eq!(phase(10, 5), 1);
        assert_eq!(phase(11, 5), 2);
        assert_eq!(phase(30, 5), 2);
        assert_eq!(phase(31, 5), 3);
        assert_eq!(phase(40, 5), 3);
        assert_eq!(phase(41, 5), 4);
        assert_eq!(phase(200, 5), 4);
    }

    #[test]
    fn short_servers_stop_early() {
        assert_eq!(phase(35, 3), 2);
        assert_eq!(phase(99, 3), 2);
        assert_eq!(phase(35, 4), 3);
        assert_eq!(phase(99, 4), 3);
    }

    #[test]
    fn default_cn_first_phase() {
        let t = TierTable::default();
        assert_eq!(
            t.row(GameServer::Cn, 0),
            [6_000_000, 8_000_000, 10_000_000, 12_000_000, 15_000_000]
        );
        assert_eq!(t.tier_count(GameServer::Cn), 3);
        // Clamped past the last configured phase.
        assert_eq!(t.row(GameServer::Cn, 4), t.row(GameServer::Cn, 2));
    }

    #[test]
    fn phase_changing_laps() {
        let t = TierTable::default();
        assert!(!t.is_phase_changing(GameServer::Jp, 1));
        assert!(t.is_phase_changing(GameServer::Jp, 3));
        assert!(t.is_phase_changing(GameServer::Jp, 10));
        assert!(t.is_phase_changing(GameServer::Jp, 30));
        assert!(!t.is_phase_changing(GameServer::Cn, 30));
    }

    #[test]
    fn server_parse_roundtrip() {
        for s in GameServer::ALL {
            assert_eq!(GameServer::parse(s.as_str()), Some(*s));
        }
        assert_eq!(GameServer::parse(" CN "), Some(GameServer::Cn));
        assert_eq!(GameServer::parse("eu"), None);
    }

    #[test]
    fn load_overrides_one_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiers.json");
        std::fs::write(&path, r#"{"cn": [[1,2,3,4,5]]}"#).unwrap();

        let t = TierTable::load(&path).unwrap();
        assert_eq!(t.row(GameServer::Cn, 0), [1, 2, 3, 4, 5]);
        assert_eq!(t.tier_count(GameServer::Cn), 1);
        assert_eq!(t.tier_count(GameServer::Jp), 5);

        std::fs::write(&path, r#"{"jp": []}"#).unwrap();
        assert!(TierTable::load(&path).is_err());
    }
}
