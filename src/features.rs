use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::deliveries::FilteredDataset;
use crate::error::{Result, ScoreError};

pub const FEATURE_NAMES: [&str; 6] = [
    "batting_team_enc",
    "bowling_team_enc",
    "over",
    "ball",
    "current_score",
    "wickets",
];

/// Where the innings total used as regression target comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    /// Largest running total derived from `runs_batter + runs_extras`.
    #[default]
    CumulativeRuns,
    /// Largest value of the source file's own `team_runs` column.
    TeamRuns,
}

impl FromStr for TargetSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cumulative_runs" | "cumulative" => Ok(TargetSource::CumulativeRuns),
            "team_runs" => Ok(TargetSource::TeamRuns),
            other => Err(format!("unknown target source: {other}")),
        }
    }
}

impl fmt::Display for TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSource::CumulativeRuns => write!(f, "cumulative_runs"),
            TargetSource::TeamRuns => write!(f, "team_runs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDelivery {
    pub match_id: i64,
    pub innings: u32,
    pub batting_team: String,
    pub bowling_team: String,
    pub over: Option<u32>,
    pub ball: Option<u32>,
    pub runs: Option<u32>,
    pub current_score: Option<u32>,
    pub wickets: u32,
    pub final_innings_score: Option<u32>,
}

#[derive(Debug, Default, Clone, Copy)]
struct InningsTally {
    score: u32,
    wickets: u32,
    target: Option<u32>,
}

/// Running score and wickets per (match, innings) in file order, plus the
/// innings total broadcast to every delivery of that innings. A running total
/// that does not fit in a `u32` is a `DataFormat` error naming the innings.
pub fn derive_features(
    dataset: &FilteredDataset,
    target: TargetSource,
) -> Result<Vec<DerivedDelivery>> {
    let mut tallies: HashMap<(i64, u32), InningsTally> = HashMap::new();
    let mut out = Vec::with_capacity(dataset.len());

    for row in dataset.rows() {
        // FilteredDataset guarantees the key and both team names.
        let Some(key) = row.group_key() else {
            continue;
        };
        let tally = tallies.entry(key).or_default();

        let runs = match (row.runs_batter, row.runs_extras) {
            (Some(batter), Some(extras)) => {
                Some(batter.checked_add(extras).ok_or_else(|| overflow(key))?)
            }
            _ => None,
        };
        let current_score = match runs {
            Some(r) => {
                tally.score = tally.score.checked_add(r).ok_or_else(|| overflow(key))?;
                Some(tally.score)
            }
            None => None,
        };
        if row.is_wicket() {
            tally.wickets += 1;
        }
        let candidate = match target {
            TargetSource::CumulativeRuns => current_score,
            TargetSource::TeamRuns => row.team_runs,
        };
        if let Some(value) = candidate {
            tally.target = Some(tally.target.map_or(value, |t| t.max(value)));
        }

        out.push(DerivedDelivery {
            match_id: key.0,
            innings: key.1,
            batting_team: row.batting_team.clone().unwrap_or_default(),
            bowling_team: row.bowling_team.clone().unwrap_or_default(),
            over: row.over,
            ball: row.ball,
            runs,
            current_score,
            wickets: tally.wickets,
            final_innings_score: None,
        });
    }

    for delivery in &mut out {
        delivery.final_innings_score = tallies
            .get(&(delivery.match_id, delivery.innings))
            .and_then(|t| t.target);
    }
    Ok(out)
}

fn overflow((match_id, innings): (i64, u32)) -> ScoreError {
    ScoreError::data_format(format!(
        "match {match_id} innings {innings}: running score overflows"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliveries::{DeliveryFilter, MatchBallRecord};

    fn ball(match_id: i64, innings: u32, runs: Option<u32>, wicket: Option<bool>) -> MatchBallRecord {
        MatchBallRecord {
            match_id: Some(match_id),
            innings: Some(innings),
            season: Some(2022),
            batting_team: Some("RR".to_string()),
            bowling_team: Some("PBKS".to_string()),
            batter: Some("bat".to_string()),
            bowler: Some("bowl".to_string()),
            runs_batter: runs,
            runs_extras: Some(0),
            bowler_wicket: wicket,
            over: Some(0),
            ball: Some(1),
            team_runs: Some(999),
        }
    }

    fn dataset(rows: Vec<MatchBallRecord>) -> FilteredDataset {
        DeliveryFilter::default().dataset(rows).unwrap()
    }

    #[test]
    fn interleaved_innings_keep_separate_tallies() {
        let rows = vec![
            ball(1, 1, Some(4), Some(false)),
            ball(1, 2, Some(1), Some(true)),
            ball(1, 1, Some(6), Some(true)),
            ball(1, 2, Some(2), None),
        ];
        let derived = derive_features(&dataset(rows), TargetSource::CumulativeRuns).unwrap();
        let scores: Vec<_> = derived.iter().map(|d| d.current_score).collect();
        assert_eq!(scores, vec![Some(4), Some(1), Some(10), Some(3)]);
        let wickets: Vec<_> = derived.iter().map(|d| d.wickets).collect();
        assert_eq!(wickets, vec![0, 1, 1, 1]);
        assert_eq!(derived[0].final_innings_score, Some(10));
        assert_eq!(derived[1].final_innings_score, Some(3));
    }

    #[test]
    fn null_runs_are_skipped_by_running_total() {
        let rows = vec![
            ball(3, 1, Some(2), None),
            ball(3, 1, None, None),
            ball(3, 1, Some(3), None),
        ];
        let derived = derive_features(&dataset(rows), TargetSource::CumulativeRuns).unwrap();
        assert_eq!(derived[1].runs, None);
        assert_eq!(derived[1].current_score, None);
        assert_eq!(derived[2].current_score, Some(5));
        assert!(derived.iter().all(|d| d.final_innings_score == Some(5)));
    }

    #[test]
    fn team_runs_target_uses_source_column() {
        let rows = vec![ball(4, 1, Some(1), None), ball(4, 1, Some(1), None)];
        let derived = derive_features(&dataset(rows), TargetSource::TeamRuns).unwrap();
        assert!(derived.iter().all(|d| d.final_innings_score == Some(999)));
    }

    #[test]
    fn oversized_runs_fail_instead_of_wrapping() {
        let rows = vec![
            ball(5, 2, Some(4_000_000_000), None),
            ball(5, 2, Some(4_000_000_000), None),
        ];
        let err = derive_features(&dataset(rows), TargetSource::CumulativeRuns).unwrap_err();
        assert!(matches!(err, ScoreError::DataFormat(msg) if msg.contains("match 5 innings 2")));

        let mut single = ball(6, 1, Some(u32::MAX), None);
        single.runs_extras = Some(1);
        let err = derive_features(&dataset(vec![single]), TargetSource::CumulativeRuns);
        assert!(err.is_err());
    }

    #[test]
    fn target_source_parses_cli_spellings() {
        assert_eq!("team-runs".parse::<TargetSource>(), Ok(TargetSource::TeamRuns));
        assert_eq!(
            "cumulative".parse::<TargetSource>(),
            Ok(TargetSource::CumulativeRuns)
        );
        assert!("max".parse::<TargetSource>().is_err());
    }
}
