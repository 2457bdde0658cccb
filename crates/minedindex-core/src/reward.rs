//! Block subsidy schedule.
//!
//! Maps a block height to the subsidy the coinbase is expected to pay out,
//! in whole coins. Eras whose nominal subsidy is below one coin (0.5, 0.25,
//! 0.125) truncate to 0.
//!
//! The table is only used as a heuristic threshold when looking for the
//! payee of a block, never for consensus checks. The payee rule compares
//! output amounts in smallest units against this whole-coin value, so an
//! attribution made by existing deployments is reproduced exactly.

/// Smallest units per coin.
pub const COIN: u64 = 100_000_000;

/// One era of the emission schedule: every height below
/// `upper_height_exclusive` (and above the previous era) pays `subsidy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardScheduleEntry {
    pub upper_height_exclusive: u64,
    /// Subsidy in whole coins.
    pub subsidy: u64,
}

const fn era(upper_height_exclusive: u64, subsidy: u64) -> RewardScheduleEntry {
    RewardScheduleEntry {
        upper_height_exclusive,
        subsidy,
    }
}

/// Single-height overrides, checked before the range table.
const OVERRIDES: [(u64, u64); 3] = [(0, 0), (1, 4_000_000), (80_185, 665_600)];

/// Ordered, non-overlapping eras. Heights past the last era pay nothing.
pub const SCHEDULE: [RewardScheduleEntry; 27] = [
    era(123_840, 128),
    era(178_378, 64),
    era(181_378, 56),
    era(184_376, 48),
    era(187_378, 40),
    era(197_378, 32),
    era(207_378, 28),
    era(217_378, 24),
    era(227_378, 22),
    era(237_378, 20),
    era(247_378, 18),
    era(287_378, 16),
    era(327_378, 15),
    era(367_378, 14),
    era(407_378, 13),
    era(447_378, 12),
    era(487_378, 11),
    era(527_378, 10),
    era(557_378, 5),
    era(1_207_378, 4),
    era(1_707_378, 3),
    era(2_207_378, 2),
    era(2_707_378, 1),
    // 0.5, 0.25 and 0.125 coin eras
    era(3_707_378, 0),
    era(4_707_378, 0),
    era(5_707_378, 0),
    era(u64::MAX, 0),
];

/// Expected block subsidy at `height`, in whole coins.
pub fn subsidy_at(height: u64) -> u64 {
    if let Some(&(_, subsidy)) = OVERRIDES.iter().find(|(h, _)| *h == height) {
        return subsidy;
    }
    SCHEDULE
        .iter()
        .find(|entry| height < entry.upper_height_exclusive)
        .map(|entry| entry.subsidy)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_overrides() {
        assert_eq!(subsidy_at(0), 0);
        assert_eq!(subsidy_at(1), 4_000_000);
        assert_eq!(subsidy_at(2), 128);
    }

    #[test]
    fn anomaly_height_override() {
        assert_eq!(subsidy_at(80_184), 128);
        assert_eq!(subsidy_at(80_185), 665_600);
        assert_eq!(subsidy_at(80_186), 128);
    }

    #[test]
    fn changes_exactly_at_each_whole_coin_breakpoint() {
        let mut previous = subsidy_at(2);
        for window in SCHEDULE.windows(2) {
            let (cur, next) = (window[0], window[1]);
            if cur.subsidy == 0 {
                break;
            }
            let last_in_era = cur.upper_height_exclusive - 1;
            assert_eq!(subsidy_at(last_in_era), cur.subsidy, "last height of era {last_in_era}");
            assert_eq!(
                subsidy_at(cur.upper_height_exclusive),
                next.subsidy,
                "first height after {last_in_era}"
            );
            assert!(cur.subsidy != next.subsidy);
            assert!(cur.subsidy <= previous);
            previous = cur.subsidy;
        }
    }

    #[test]
    fn constant_within_era() {
        for h in [200_000, 205_000, 207_377] {
            assert_eq!(subsidy_at(h), 28);
        }
    }

    #[test]
    fn fractional_eras_truncate_to_zero() {
        assert_eq!(subsidy_at(2_707_377), 1);
        assert_eq!(subsidy_at(2_707_378), 0);
        assert_eq!(subsidy_at(3_000_000), 0);
        assert_eq!(subsidy_at(4_000_000), 0);
        assert_eq!(subsidy_at(5_707_377), 0);
    }

    #[test]
    fn terminal_era_pays_nothing() {
        assert_eq!(subsidy_at(5_707_378), 0);
        assert_eq!(subsidy_at(u64::MAX), 0);
    }

    #[test]
    fn table_is_ordered() {
        assert!(SCHEDULE
            .windows(2)
            .all(|w| w[0].upper_height_exclusive < w[1].upper_height_exclusive));
    }
}
