use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ipl_score::config::{default_artifact_dir, load_dotenv};
use ipl_score::{MatchSituation, ScorePredictor};

/// Predict a final innings score from one match situation.
#[derive(Debug, Parser)]
#[command(name = "ipl_predict")]
struct Args {
    #[arg(long, env = "IPL_ARTIFACT_DIR")]
    artifacts: Option<PathBuf>,

    /// Print the known team names and exit.
    #[arg(long)]
    list_teams: bool,

    #[arg(long)]
    batting: Option<String>,

    #[arg(long)]
    bowling: Option<String>,

    #[arg(long, default_value_t = 5)]
    over: u32,

    #[arg(long, default_value_t = 3)]
    ball: u32,

    #[arg(long, default_value_t = 50)]
    runs: u32,

    #[arg(long, default_value_t = 3)]
    wickets: u32,
}

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let dir = args.artifacts.clone().unwrap_or_else(default_artifact_dir);
    let predictor = ScorePredictor::open(&dir)?;

    if args.list_teams {
        for (id, name) in predictor.get_team_names().iter().enumerate() {
            println!("{id:>3}  {name}");
        }
        return Ok(());
    }

    let (Some(batting_team), Some(bowling_team)) = (args.batting, args.bowling) else {
        bail!("--batting and --bowling are required (see --list-teams)");
    };
    let situation = MatchSituation {
        batting_team,
        bowling_team,
        over: args.over,
        ball: args.ball,
        current_score: args.runs,
        wickets: args.wickets,
    };
    let prediction = predictor.predict(&situation)?;

    println!(
        "{} v {} at {}.{}: {}/{}",
        situation.batting_team,
        situation.bowling_team,
        situation.over,
        situation.ball,
        situation.current_score,
        situation.wickets
    );
    println!("Predicted final score: {} runs", prediction.final_score as i64);
    println!("Winning probability (approx.): {}%", prediction.win_probability);
    Ok(())
}
