use std::sync::atomic::{AtomicI64, Ordering};

use crate::tier::GameServer;
use crate::{DayKey, TimeKey};

const DAY_S: i64 = 86_400;
/// Game day starts at 05:00 server local time.
const ROLLOVER_S: i64 = 5 * 3600;

/// Maps wall time to game days and back.
pub trait GameClock: Send + Sync {
    fn now_unix(&self) -> i64;

    fn game_day(&self, server: GameServer, unix: i64) -> (DayKey, TimeKey) {
        let local = unix + server.utc_offset_hours() * 3600 - ROLLOVER_S;
        (local.div_euclid(DAY_S), local.rem_euclid(DAY_S))
    }

    fn to_unix(&self, server: GameServer, day: DayKey, time: TimeKey) -> i64 {
        day * DAY_S + time + ROLLOVER_S - server.utc_offset_hours() * 3600
    }

    fn today(&self, server: GameServer) -> (DayKey, TimeKey) {
        self.game_day(server, self.now_unix())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ServerClock;

impl GameClock for ServerClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(unix: i64) -> Self {
        Self {
            now: AtomicI64::new(unix),
        }
    }

    pub fn set(&self, unix: i64) {
        self.now.store(unix, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl GameClock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_rolls_at_five_local() {
        let c = FixedClock::new(0);
        // 1970-01-01 20:00 UTC is 05:00 next day in Tokyo.
        let (d1, t1) = c.game_day(GameServer::Jp, 20 * 3600 - 1);
        let (d2, t2) = c.game_day(GameServer::Jp, 20 * 3600);
        assert_eq!(d2, d1 + 1);
        assert_eq!(t1, DAY_S - 1);
        assert_eq!(t2, 0);

        // Same instant is an hour earlier in Shanghai.
        let (d3, t3) = c.game_day(GameServer::Cn, 20 * 3600);
        assert_eq!(d3, d1);
        assert_eq!(t3, DAY_S - 3600);
    }

    #[test]
    fn inverse_round_trips() {
        let c = FixedClock::new(1_700_000_000);
        for s in GameServer::ALL {
            let (d, t) = c.today(*s);
            assert_eq!(c.to_unix(*s, d, t), 1_700_000_000);
        }
        c.advance(DAY_S);
        assert_eq!(
            c.today(GameServer::Tw).0,
            c.game_day(GameServer::Tw, 1_700_000_000).0 + 1
        );
    }
}
