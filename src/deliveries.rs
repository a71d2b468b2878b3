use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use tracing::{debug, info};

use crate::error::{Result, ScoreError};

pub const REQUIRED_COLUMNS: [&str; 13] = [
    "season",
    "innings",
    "match_id",
    "batting_team",
    "bowling_team",
    "batter",
    "bowler",
    "runs_batter",
    "runs_extras",
    "bowler_wicket",
    "over",
    "ball",
    "team_runs",
];

const SEASON: usize = 0;
const INNINGS: usize = 1;
const MATCH_ID: usize = 2;
const BATTING_TEAM: usize = 3;
const BOWLING_TEAM: usize = 4;
const BATTER: usize = 5;
const BOWLER: usize = 6;
const RUNS_BATTER: usize = 7;
const RUNS_EXTRAS: usize = 8;
const BOWLER_WICKET: usize = 9;
const OVER: usize = 10;
const BALL: usize = 11;
const TEAM_RUNS: usize = 12;

/// One delivery as it appears in the source file. `None` marks a null cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchBallRecord {
    pub match_id: Option<i64>,
    pub innings: Option<u32>,
    pub season: Option<i32>,
    pub batting_team: Option<String>,
    pub bowling_team: Option<String>,
    pub batter: Option<String>,
    pub bowler: Option<String>,
    pub runs_batter: Option<u32>,
    pub runs_extras: Option<u32>,
    pub bowler_wicket: Option<bool>,
    pub over: Option<u32>,
    pub ball: Option<u32>,
    pub team_runs: Option<u32>,
}

impl MatchBallRecord {
    pub fn runs(&self) -> Option<u32> {
        self.runs_batter?.checked_add(self.runs_extras?)
    }

    pub fn group_key(&self) -> Option<(i64, u32)> {
        Some((self.match_id?, self.innings?))
    }

    pub fn is_wicket(&self) -> bool {
        self.bowler_wicket.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryFilter {
    pub season_min: i32,
    pub season_max: i32,
    pub max_innings: u32,
}

impl Default for DeliveryFilter {
    fn default() -> Self {
        Self {
            season_min: 2020,
            season_max: 2025,
            max_innings: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub read: usize,
    pub kept: usize,
    pub no_season: usize,
    pub out_of_window: usize,
    pub bad_innings: usize,
    pub incomplete: usize,
}

enum Rejection {
    NoSeason,
    OutOfWindow,
    BadInnings,
    Incomplete,
}

impl DeliveryFilter {
    pub fn keeps(&self, row: &MatchBallRecord) -> bool {
        self.reject_reason(row).is_none()
    }

    fn reject_reason(&self, row: &MatchBallRecord) -> Option<Rejection> {
        let Some(season) = row.season else {
            return Some(Rejection::NoSeason);
        };
        if season < self.season_min || season > self.season_max {
            return Some(Rejection::OutOfWindow);
        }
        if !row
            .innings
            .is_some_and(|innings| (1..=self.max_innings).contains(&innings))
        {
            return Some(Rejection::BadInnings);
        }
        let named = [
            &row.batting_team,
            &row.bowling_team,
            &row.batter,
            &row.bowler,
        ]
        .iter()
        .all(|name| name.as_deref().is_some_and(|s| !s.trim().is_empty()));
        if !named || row.match_id.is_none() {
            return Some(Rejection::Incomplete);
        }
        None
    }

    pub fn apply(&self, rows: Vec<MatchBallRecord>) -> Vec<MatchBallRecord> {
        rows.into_iter().filter(|row| self.keeps(row)).collect()
    }

    pub fn dataset(&self, rows: Vec<MatchBallRecord>) -> Result<FilteredDataset> {
        let mut stats = FilterStats {
            read: rows.len(),
            ..FilterStats::default()
        };
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            match self.reject_reason(&row) {
                None => kept.push(row),
                Some(Rejection::NoSeason) => stats.no_season += 1,
                Some(Rejection::OutOfWindow) => stats.out_of_window += 1,
                Some(Rejection::BadInnings) => stats.bad_innings += 1,
                Some(Rejection::Incomplete) => stats.incomplete += 1,
            }
        }
        stats.kept = kept.len();
        info!(
            read = stats.read,
            kept = stats.kept,
            no_season = stats.no_season,
            out_of_window = stats.out_of_window,
            bad_innings = stats.bad_innings,
            incomplete = stats.incomplete,
            "filtered deliveries"
        );
        if kept.is_empty() {
            return Err(ScoreError::EmptyDataset {
                season_min: self.season_min,
                season_max: self.season_max,
            });
        }
        Ok(FilteredDataset {
            rows: kept,
            filter: *self,
            stats,
        })
    }
}

/// Deliveries that passed a [`DeliveryFilter`]. Never empty.
#[derive(Debug, Clone)]
pub struct FilteredDataset {
    rows: Vec<MatchBallRecord>,
    filter: DeliveryFilter,
    stats: FilterStats,
}

impl FilteredDataset {
    pub fn rows(&self) -> &[MatchBallRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn filter(&self) -> DeliveryFilter {
        self.filter
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    pub fn team_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for row in &self.rows {
            if let Some(name) = row.batting_team.as_deref() {
                names.insert(name);
            }
            if let Some(name) = row.bowling_team.as_deref() {
                names.insert(name);
            }
        }
        names
    }

    pub fn into_rows(self) -> Vec<MatchBallRecord> {
        self.rows
    }
}

pub fn load_deliveries(path: &Path) -> Result<Vec<MatchBallRecord>> {
    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    let rows = if is_parquet {
        read_parquet(path)?
    } else {
        read_csv(fs::File::open(path)?)?
    };
    info!(path = %path.display(), rows = rows.len(), "loaded deliveries");
    Ok(rows)
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<MatchBallRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|err| ScoreError::data_format(format!("read csv header: {err}")))?
        .clone();
    let positions = column_positions(headers.iter())?;

    let mut out = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let row_no = idx + 1;
        let record = record
            .map_err(|err| ScoreError::data_format(format!("csv row {row_no}: {err}")))?;
        let cells: Vec<Cell> = positions
            .iter()
            .map(|pos| match record.get(*pos) {
                Some(raw) if !raw.is_empty() => Cell::Text(raw.to_string()),
                _ => Cell::Null,
            })
            .collect();
        out.push(record_from_cells(&cells, row_no)?);
    }
    Ok(out)
}

pub fn read_parquet(path: &Path) -> Result<Vec<MatchBallRecord>> {
    let file = fs::File::open(path)?;
    let reader = SerializedFileReader::new(file)
        .map_err(|err| ScoreError::data_format(format!("open parquet reader: {err}")))?;
    let schema_names = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect::<Vec<_>>();
    let positions = column_positions(schema_names.iter().map(String::as_str))?;
    let slot_by_name: HashMap<&str, usize> = REQUIRED_COLUMNS
        .iter()
        .enumerate()
        .map(|(slot, name)| (*name, slot))
        .collect();
    debug!(columns = schema_names.len(), ?positions, "parquet schema resolved");

    let iter = reader
        .get_row_iter(None)
        .map_err(|err| ScoreError::data_format(format!("iterate parquet rows: {err}")))?;
    let mut out = Vec::new();
    for (idx, row) in iter.enumerate() {
        let row_no = idx + 1;
        let row = row
            .map_err(|err| ScoreError::data_format(format!("parquet row {row_no}: {err}")))?;
        let mut cells = vec![Cell::Null; REQUIRED_COLUMNS.len()];
        for (name, field) in row.get_column_iter() {
            if let Some(slot) = slot_by_name.get(name.as_str()) {
                cells[*slot] = cell_from_field(field);
            }
        }
        out.push(record_from_cells(&cells, row_no)?);
    }
    Ok(out)
}

fn column_positions<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<usize>> {
    let index: HashMap<String, usize> = names
        .enumerate()
        .map(|(pos, name)| (name.trim().to_string(), pos))
        .collect();
    let mut positions = Vec::with_capacity(REQUIRED_COLUMNS.len());
    let mut missing = Vec::new();
    for col in REQUIRED_COLUMNS {
        match index.get(col) {
            Some(pos) => positions.push(*pos),
            None => missing.push(col),
        }
    }
    if !missing.is_empty() {
        return Err(ScoreError::data_format(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }
    Ok(positions)
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

fn cell_from_field(field: &Field) -> Cell {
    match field {
        Field::Null => Cell::Null,
        Field::Bool(v) => Cell::Bool(*v),
        Field::Byte(v) => Cell::Int(i64::from(*v)),
        Field::Short(v) => Cell::Int(i64::from(*v)),
        Field::Int(v) => Cell::Int(i64::from(*v)),
        Field::Long(v) => Cell::Int(*v),
        Field::UByte(v) => Cell::Int(i64::from(*v)),
        Field::UShort(v) => Cell::Int(i64::from(*v)),
        Field::UInt(v) => Cell::Int(i64::from(*v)),
        Field::ULong(v) => i64::try_from(*v).map(Cell::Int).unwrap_or(Cell::Null),
        Field::Float(v) => Cell::Float(f64::from(*v)),
        Field::Double(v) => Cell::Float(*v),
        Field::Str(v) => Cell::Text(v.clone()),
        _ => Cell::Null,
    }
}

fn record_from_cells(cells: &[Cell], row_no: usize) -> Result<MatchBallRecord> {
    Ok(MatchBallRecord {
        match_id: parse_int(&cells[MATCH_ID], "match_id", row_no)?,
        innings: parse_count(&cells[INNINGS], "innings", row_no)?,
        season: parse_season(&cells[SEASON]),
        batting_team: parse_text(&cells[BATTING_TEAM]),
        bowling_team: parse_text(&cells[BOWLING_TEAM]),
        batter: parse_text(&cells[BATTER]),
        bowler: parse_text(&cells[BOWLER]),
        runs_batter: parse_count(&cells[RUNS_BATTER], "runs_batter", row_no)?,
        runs_extras: parse_count(&cells[RUNS_EXTRAS], "runs_extras", row_no)?,
        bowler_wicket: parse_flag(&cells[BOWLER_WICKET], "bowler_wicket", row_no)?,
        over: parse_count(&cells[OVER], "over", row_no)?,
        ball: parse_count(&cells[BALL], "ball", row_no)?,
        team_runs: parse_count(&cells[TEAM_RUNS], "team_runs", row_no)?,
    })
}

fn is_null_text(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty()
        || raw.eq_ignore_ascii_case("na")
        || raw.eq_ignore_ascii_case("nan")
        || raw.eq_ignore_ascii_case("null")
        || raw.eq_ignore_ascii_case("none")
}

fn parse_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Text(raw) if !is_null_text(raw) => Some(raw.trim().to_string()),
        Cell::Int(v) => Some(v.to_string()),
        _ => None,
    }
}

fn numeric(cell: &Cell) -> Option<Option<f64>> {
    match cell {
        Cell::Null => Some(None),
        Cell::Int(v) => Some(Some(*v as f64)),
        Cell::Float(v) if v.is_nan() => Some(None),
        Cell::Float(v) => Some(Some(*v)),
        Cell::Bool(v) => Some(Some(if *v { 1.0 } else { 0.0 })),
        Cell::Text(raw) if is_null_text(raw) => Some(None),
        Cell::Text(raw) => raw.trim().parse::<f64>().ok().map(Some),
    }
}

// Seasons that are not whole numbers ("2007/08", "2021.5") drop out of the
// dataset instead of failing the load.
fn parse_season(cell: &Cell) -> Option<i32> {
    let value = numeric(cell).flatten()?;
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    i32::try_from(value as i64).ok()
}

fn parse_int(cell: &Cell, column: &str, row_no: usize) -> Result<Option<i64>> {
    let Some(value) = numeric(cell) else {
        return Err(bad_value(cell, column, row_no));
    };
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v.fract() == 0.0 => Ok(Some(v as i64)),
        Some(_) => Err(bad_value(cell, column, row_no)),
    }
}

fn parse_count(cell: &Cell, column: &str, row_no: usize) -> Result<Option<u32>> {
    match parse_int(cell, column, row_no)? {
        None => Ok(None),
        Some(v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| bad_value(cell, column, row_no)),
    }
}

fn parse_flag(cell: &Cell, column: &str, row_no: usize) -> Result<Option<bool>> {
    if let Cell::Text(raw) = cell {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            return Ok(Some(true));
        }
        if raw.eq_ignore_ascii_case("false") {
            return Ok(Some(false));
        }
    }
    match numeric(cell) {
        Some(None) => Ok(None),
        Some(Some(v)) if v == 0.0 => Ok(Some(false)),
        Some(Some(v)) if v == 1.0 => Ok(Some(true)),
        _ => Err(bad_value(cell, column, row_no)),
    }
}

fn bad_value(cell: &Cell, column: &str, row_no: usize) -> ScoreError {
    ScoreError::data_format(format!(
        "row {row_no}: column {column} has unusable value {cell:?}"
    ))
}
