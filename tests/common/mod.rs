#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::PathBuf;

pub const HEADER: &str = "season,innings,match_id,batting_team,bowling_team,batter,bowler,runs_batter,runs_extras,bowler_wicket,over,ball,team_runs";

/// (runs_batter, runs_extras, bowler_wicket)
pub type ScriptedBall = (u32, u32, bool);

#[derive(Default)]
pub struct CsvBuilder {
    body: String,
}

impl CsvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn innings(
        mut self,
        season: &str,
        match_id: i64,
        innings: u32,
        batting: &str,
        bowling: &str,
        balls: &[ScriptedBall],
    ) -> Self {
        let mut total = 0;
        for (i, (bat, extras, wicket)) in balls.iter().enumerate() {
            total += bat + extras;
            let over = i / 6;
            let ball = i % 6 + 1;
            let _ = writeln!(
                self.body,
                "{season},{innings},{match_id},{batting},{bowling},batter{},bowler{over},{bat},{extras},{wicket},{over},{ball},{total}",
                i % 11
            );
        }
        self
    }

    pub fn raw(mut self, line: &str) -> Self {
        self.body.push_str(line);
        self.body.push('\n');
        self
    }

    pub fn build(&self) -> String {
        format!("{HEADER}\n{}", self.body)
    }
}

/// Six overs totalling 160 with a wicket every twelfth ball.
pub fn big_innings() -> Vec<ScriptedBall> {
    (0..36)
        .map(|i| {
            let runs = if i % 4 == 0 && i < 32 { 6 } else { 4 };
            (runs, 0, i % 12 == 11)
        })
        .collect()
}

pub fn short_innings(runs: u32) -> Vec<ScriptedBall> {
    vec![
        (runs, 0, false),
        (0, 1, false),
        (1, 0, true),
        (2, 0, false),
        (0, 0, true),
        (runs, 0, false),
    ]
}

/// Two matches, two innings each, inside the default season window.
pub fn two_match_csv() -> String {
    CsvBuilder::new()
        .innings("2023", 1, 1, "Mumbai Indians", "Chennai Super Kings", &big_innings())
        .innings("2023", 1, 2, "Chennai Super Kings", "Mumbai Indians", &short_innings(4))
        .innings("2024", 2, 1, "Gujarat Titans", "Rajasthan Royals", &short_innings(6))
        .innings("2024", 2, 2, "Rajasthan Royals", "Gujarat Titans", &short_innings(1))
        .build()
}

pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ipl_score_it_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
