use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ipl_score::config::{default_artifact_dir, load_dotenv};
use ipl_score::predictor::{MAX_BALL, MAX_OVER, MAX_WICKETS};
use ipl_score::{MatchSituation, ScoreError, ScorePredictor};

const MAX_RUNS: u32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormField {
    Batting,
    Bowling,
    Over,
    Ball,
    Runs,
    Wickets,
}

const FIELDS: [FormField; 6] = [
    FormField::Batting,
    FormField::Bowling,
    FormField::Over,
    FormField::Ball,
    FormField::Runs,
    FormField::Wickets,
];

enum Status {
    Idle,
    Predicted { score: f64, win_prob: f64 },
    Info(String),
    Error(String),
}

struct App {
    artifact_dir: PathBuf,
    predictor: Option<ScorePredictor>,
    teams: Vec<String>,
    batting: usize,
    bowling: usize,
    over: u32,
    ball: u32,
    runs: u32,
    wickets: u32,
    focus: usize,
    status: Status,
    should_quit: bool,
}

impl App {
    fn new(artifact_dir: PathBuf) -> Result<Self> {
        let mut app = Self {
            artifact_dir,
            predictor: None,
            teams: Vec::new(),
            batting: 0,
            bowling: 1,
            over: 5,
            ball: 3,
            runs: 50,
            wickets: 3,
            focus: 0,
            status: Status::Idle,
            should_quit: false,
        };
        app.load_artifacts()?;
        Ok(app)
    }

    fn load_artifacts(&mut self) -> Result<()> {
        if self.predictor.is_none() {
            return match ScorePredictor::open(&self.artifact_dir) {
                Ok(predictor) => {
                    self.predictor = Some(predictor);
                    self.sync_teams();
                    self.status = Status::Info("Model loaded".to_string());
                    Ok(())
                }
                Err(err) => self.report(err),
            };
        }
        let Some(predictor) = self.predictor.as_mut() else {
            return Ok(());
        };
        // The current pair stays in service whatever reload runs into.
        match predictor.reload() {
            Ok(changed) => {
                self.sync_teams();
                let msg = if changed { "Model reloaded" } else { "Model unchanged" };
                self.status = Status::Info(msg.to_string());
            }
            Err(err) => {
                warn!(error = %err, "reload failed, keeping current model");
                self.status = Status::Error(format!("reload failed: {err}"));
            }
        }
        Ok(())
    }

    fn sync_teams(&mut self) {
        let Some(predictor) = self.predictor.as_ref() else {
            return;
        };
        let previous_batting = self.teams.get(self.batting).cloned();
        let previous_bowling = self.teams.get(self.bowling).cloned();
        self.teams = predictor.get_team_names().to_vec();
        self.batting = previous_batting
            .and_then(|name| self.teams.iter().position(|t| *t == name))
            .unwrap_or(0);
        self.bowling = previous_bowling
            .and_then(|name| self.teams.iter().position(|t| *t == name))
            .unwrap_or(1);
        self.fix_bowling(1);
    }

    // Keeps the bowling side off the batting side, stepping in `dir` to find one.
    fn fix_bowling(&mut self, dir: isize) {
        let n = self.teams.len();
        if n < 2 {
            return;
        }
        self.bowling %= n;
        if self.bowling == self.batting {
            self.bowling = step(self.bowling, dir, n);
        }
    }

    fn report(&mut self, err: ScoreError) -> Result<()> {
        if err.is_user_facing() {
            warn!(error = %err, "shown in form");
            self.status = Status::Error(err.to_string());
            return Ok(());
        }
        Err(err.into())
    }

    fn on_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') | KeyCode::BackTab => {
                self.focus = step(self.focus, -1, FIELDS.len());
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.focus = step(self.focus, 1, FIELDS.len());
            }
            KeyCode::Left | KeyCode::Char('h') => self.adjust(-1),
            KeyCode::Right | KeyCode::Char('l') => self.adjust(1),
            KeyCode::Char(c) if c.is_ascii_digit() => self.type_digit(c),
            KeyCode::Backspace if FIELDS[self.focus] == FormField::Runs => self.runs /= 10,
            KeyCode::Char('r') => self.load_artifacts()?,
            KeyCode::Enter | KeyCode::Char('p') => self.predict()?,
            _ => {}
        }
        Ok(())
    }

    fn adjust(&mut self, delta: i64) {
        let n = self.teams.len();
        match FIELDS[self.focus] {
            FormField::Batting if n > 0 => {
                self.batting = step(self.batting, delta as isize, n);
                self.fix_bowling(delta as isize);
            }
            FormField::Bowling if n > 1 => {
                self.bowling = step(self.bowling, delta as isize, n);
                self.fix_bowling(delta as isize);
            }
            FormField::Over => self.over = clamp_add(self.over, delta, 0, MAX_OVER),
            FormField::Ball => self.ball = clamp_add(self.ball, delta, 1, MAX_BALL),
            FormField::Runs => self.runs = clamp_add(self.runs, delta, 0, MAX_RUNS),
            FormField::Wickets => self.wickets = clamp_add(self.wickets, delta, 0, MAX_WICKETS),
            _ => {}
        }
    }

    fn type_digit(&mut self, c: char) {
        if FIELDS[self.focus] != FormField::Runs {
            return;
        }
        let digit = c.to_digit(10).unwrap_or(0);
        self.runs = (self.runs * 10 + digit).min(MAX_RUNS);
    }

    fn situation(&self) -> Option<MatchSituation> {
        Some(MatchSituation {
            batting_team: self.teams.get(self.batting)?.clone(),
            bowling_team: self.teams.get(self.bowling)?.clone(),
            over: self.over,
            ball: self.ball,
            current_score: self.runs,
            wickets: self.wickets,
        })
    }

    fn predict(&mut self) -> Result<()> {
        if self.predictor.is_none() {
            return self.report(ScoreError::ArtifactNotFound(self.artifact_dir.clone()));
        }
        let Some(situation) = self.situation() else {
            return self.report(ScoreError::prediction_input("pick two different teams"));
        };
        let Some(predictor) = self.predictor.as_ref() else {
            return Ok(());
        };
        match predictor.predict(&situation) {
            Ok(prediction) => {
                info!(
                    batting = %situation.batting_team,
                    bowling = %situation.bowling_team,
                    score = prediction.final_score,
                    "prediction"
                );
                self.status = Status::Predicted {
                    score: prediction.final_score,
                    win_prob: prediction.win_probability,
                };
                Ok(())
            }
            Err(err) => self.report(err),
        }
    }
}

fn step(idx: usize, dir: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (idx as isize + dir).rem_euclid(len as isize) as usize
}

fn clamp_add(value: u32, delta: i64, min: u32, max: u32) -> u32 {
    (i64::from(value) + delta).clamp(i64::from(min), i64::from(max)) as u32
}

fn init_file_logging(dir: &Path) {
    if fs::create_dir_all(dir).is_err() {
        return;
    }
    let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("ipl_score.log"))
    else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn main() -> Result<()> {
    load_dotenv();
    let artifact_dir = default_artifact_dir();
    init_file_logging(&artifact_dir);

    let mut app = App::new(artifact_dir)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.context("interactive session ended")
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(250);
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(tick_rate)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key)?;
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(8),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let form = Paragraph::new(form_lines(app)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Match Situation "),
    );
    frame.render_widget(form, chunks[1]);

    let result = Paragraph::new(status_lines(&app.status))
        .block(Block::default().borders(Borders::ALL).title(" Prediction "));
    frame.render_widget(result, chunks[2]);

    let footer = Paragraph::new(
        "j/k/Tab Move | h/l/←/→ Change | 0-9 Runs | Enter Predict | r Reload | q Quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);
}

fn header_text(app: &App) -> String {
    match app.predictor.as_ref() {
        Some(p) => format!(
            "IPL SCORE PREDICTOR | {} teams | model {}",
            app.teams.len(),
            p.model().generated_at
        ),
        None => "IPL SCORE PREDICTOR | no model loaded".to_string(),
    }
}

fn form_lines(app: &App) -> Vec<Line<'static>> {
    let team = |idx: usize| {
        app.teams
            .get(idx)
            .cloned()
            .unwrap_or_else(|| "-".to_string())
    };
    FIELDS
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let (label, value) = match field {
                FormField::Batting => ("Batting Team", format!("< {} >", team(app.batting))),
                FormField::Bowling => ("Bowling Team", format!("< {} >", team(app.bowling))),
                FormField::Over => ("Current Over", format!("{}  (0-{MAX_OVER})", app.over)),
                FormField::Ball => ("Ball in Over", format!("{}  (1-{MAX_BALL})", app.ball)),
                FormField::Runs => ("Current Runs", app.runs.to_string()),
                FormField::Wickets => {
                    ("Wickets Fallen", format!("{}  (0-{MAX_WICKETS})", app.wickets))
                }
            };
            let focused = i == app.focus;
            let marker = if focused { "> " } else { "  " };
            let style = if focused {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{marker}{label:<16}"), style),
                Span::styled(value, style),
            ])
        })
        .collect()
}

fn status_lines(status: &Status) -> Vec<Line<'static>> {
    match status {
        Status::Idle => vec![Line::from("Press Enter to predict.")],
        Status::Predicted { score, win_prob } => vec![
            Line::from(Span::styled(
                format!("Predicted Final Score: {} runs", *score as i64),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("Winning Probability (approx.): {win_prob}%"),
                Style::default().fg(Color::Cyan),
            )),
        ],
        Status::Info(msg) => vec![Line::from(Span::styled(
            msg.clone(),
            Style::default().fg(Color::DarkGray),
        ))],
        Status::Error(msg) => vec![Line::from(Span::styled(
            format!("Error: {msg}"),
            Style::default().fg(Color::Red),
        ))],
    }
}
