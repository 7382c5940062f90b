//! Data Loading and Management
//!
//! Handles the three external sources with Polars:
//! - NSCH topical survey files, one table per year ([`DatasetRegistry`])
//! - Census cartographic boundary attributes ([`GeoReference`])
//! - BEA regional GDP tables in long format ([`EconomicPanel`])
//!
//! plus the survey question guide used to label response codes.

use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::utils::geo_keys::{is_state_or_dc, parse_fips, StateCode};
use crate::utils::{column_as_state, require_columns, ResponseCodes};

/// Survey year
pub type Year = u16;

/// Year → survey table
///
/// The only stateful component of the pipeline; every stage downstream takes
/// a table out of here and returns a new one.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    tables: BTreeMap<Year, DataFrame>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, year: Year, table: DataFrame) -> Option<DataFrame> {
        self.tables.insert(year, table)
    }

    pub fn get(&self, year: Year) -> std::result::Result<&DataFrame, PipelineError> {
        self.tables.get(&year).ok_or(PipelineError::MissingYear(year))
    }

    pub fn years(&self) -> Vec<Year> {
        self.tables.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, &DataFrame)> {
        self.tables.iter().map(|(year, df)| (*year, df))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Raw topical file for a year: parquet if present, otherwise CSV
    fn raw_path(dir: &Path, year: Year) -> PathBuf {
        let parquet = dir.join(format!("nsch_{}e_topical.parquet", year));
        if parquet.exists() {
            parquet
        } else {
            dir.join(format!("nsch_{}e_topical.csv", year))
        }
    }

    fn snapshot_path(dir: &Path, year: Year) -> PathBuf {
        dir.join(format!("nsch_{}_imputed.parquet", year))
    }

    /// Load the raw topical files for the requested years
    pub fn load_raw(dir: &Path, years: &[Year]) -> Result<Self> {
        let mut registry = Self::new();
        for &year in years {
            let path = Self::raw_path(dir, year);
            let df = read_table(&path)?;
            info!(year, rows = df.height(), cols = df.width(), "Loaded survey table");
            registry.insert(year, df);
        }
        Ok(registry)
    }

    /// Persist every table as a parquet snapshot
    pub fn write_snapshot(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create snapshot dir: {:?}", dir))?;
        for (year, df) in self.iter() {
            let path = Self::snapshot_path(dir, year);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create parquet file: {:?}", path))?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Zstd(None))
                .finish(&mut df.clone())
                .with_context(|| format!("Failed to write parquet: {:?}", path))?;
            debug!(year, path = ?path, "Wrote snapshot");
        }
        Ok(())
    }

    /// Read back snapshots written by [`write_snapshot`](Self::write_snapshot)
    pub fn read_snapshot(dir: &Path, years: &[Year]) -> Result<Self> {
        let mut registry = Self::new();
        for &year in years {
            let path = Self::snapshot_path(dir, year);
            registry.insert(year, read_table(&path)?);
        }
        Ok(registry)
    }
}

/// Read a CSV or parquet table, chosen by extension
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let is_parquet = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("parquet"));

    if is_parquet {
        let file = File::open(path).with_context(|| format!("Failed to open parquet: {:?}", path))?;
        ParquetReader::new(file)
            .finish()
            .with_context(|| format!("Failed to read parquet: {:?}", path))
    } else {
        let parse_options = CsvParseOptions::default()
            .with_null_values(Some(NullValues::AllColumnsSingle("NA".into())))
            .with_truncate_ragged_lines(true);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .with_parse_options(parse_options)
            .try_into_reader_with_file_path(Some(path.into()))
            .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
            .finish()
            .with_context(|| format!("Failed to load CSV: {:?}", path))
    }
}

/// Write a frame as CSV
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create CSV: {:?}", path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df.clone())
        .with_context(|| format!("Failed to write CSV: {:?}", path))
}

/// State boundary attributes keyed by padded FIPS string
///
/// Geometry columns, if any, are carried through untouched.
#[derive(Debug, Clone)]
pub struct GeoReference {
    frame: DataFrame,
    lookup: FxHashMap<StateCode, (String, String)>,
}

impl GeoReference {
    pub const STATEFP: &'static str = "STATEFP";
    pub const POSTAL: &'static str = "STUSPS";
    pub const NAME: &'static str = "NAME";
    pub const STATE_KEY: &'static str = "FIPSST";

    pub fn load_csv(path: &Path) -> Result<Self> {
        let df = read_table(path)?;
        Self::from_frame(df).with_context(|| format!("Invalid geographic reference: {:?}", path))
    }

    /// Validate and derive the numeric `FIPSST` key from `STATEFP`
    pub fn from_frame(mut frame: DataFrame) -> std::result::Result<Self, PipelineError> {
        require_columns(
            &frame,
            &[Self::STATEFP, Self::POSTAL, Self::NAME],
            "geographic reference",
        )?;

        let statefp = frame.column(Self::STATEFP)?.cast(&DataType::String)?;
        let codes: Vec<Option<u32>> = statefp
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_fips))
            .collect();

        let postal = frame.column(Self::POSTAL)?.cast(&DataType::String)?;
        let names = frame.column(Self::NAME)?.cast(&DataType::String)?;
        let mut lookup = FxHashMap::default();
        for (idx, code) in codes.iter().enumerate() {
            if let (Some(code), Some(p), Some(n)) = (code, postal.str()?.get(idx), names.str()?.get(idx)) {
                lookup.insert(*code, (p.to_string(), n.to_string()));
            }
        }

        frame.with_column(Column::new(Self::STATE_KEY.into(), codes))?;
        Ok(Self { frame, lookup })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn contains(&self, state: StateCode) -> bool {
        self.lookup.contains_key(&state)
    }

    pub fn postal_code(&self, state: StateCode) -> Option<&str> {
        self.lookup.get(&state).map(|(p, _)| p.as_str())
    }

    pub fn state_name(&self, state: StateCode) -> Option<&str> {
        self.lookup.get(&state).map(|(_, n)| n.as_str())
    }

    pub fn state_for_postal(&self, postal: &str) -> Option<StateCode> {
        self.lookup
            .iter()
            .find(|(_, (p, _))| p.eq_ignore_ascii_case(postal.trim()))
            .map(|(code, _)| *code)
    }
}

/// Wide per-state economic table
///
/// Columns are addressed by `(indicator, year)` rather than by parsing names.
#[derive(Debug, Clone)]
pub struct EconomicPanel {
    frame: DataFrame,
    columns: BTreeMap<(String, Year), String>,
}

impl EconomicPanel {
    pub const GEO_FIPS: &'static str = "GeoFips";
    pub const DESCRIPTION: &'static str = "Description";
    pub const STATE_KEY: &'static str = "FIPSST";

    pub fn column_name(indicator: &str, year: Year) -> String {
        format!("{} [{}]", indicator.trim(), year)
    }

    /// Wrap an already-wide frame; every indexed column must exist and
    /// the frame must carry `FIPSST`
    pub fn new(
        frame: DataFrame,
        columns: BTreeMap<(String, Year), String>,
    ) -> std::result::Result<Self, PipelineError> {
        let mut required: Vec<&str> = vec![Self::STATE_KEY];
        required.extend(columns.values().map(String::as_str));
        require_columns(&frame, &required, "economic panel")?;
        Ok(Self { frame, columns })
    }

    pub fn load_csv(path: &Path, geo: &GeoReference) -> Result<Self> {
        let long = read_table(path)?;
        Self::from_long(&long, geo).with_context(|| format!("Invalid economic panel: {:?}", path))
    }

    /// Clean, pivot and merge a BEA long table
    ///
    /// Input rows are (GeoFips, Description) with one column per year.
    /// Non-numeric cells such as `(NA)` or `(D)` become missing. Aggregate
    /// geographies and states absent from the reference are dropped by the
    /// inner merge.
    pub fn from_long(long: &DataFrame, geo: &GeoReference) -> std::result::Result<Self, PipelineError> {
        require_columns(long, &[Self::GEO_FIPS, Self::DESCRIPTION], "economic panel")?;

        let year_columns: Vec<(Year, String)> = long
            .get_column_names()
            .into_iter()
            .filter_map(|name| {
                let trimmed = name.trim();
                (trimmed.len() == 4)
                    .then(|| trimmed.parse::<Year>().ok())
                    .flatten()
                    .map(|year| (year, name.to_string()))
            })
            .collect();

        let geo_fips = long.column(Self::GEO_FIPS)?.cast(&DataType::String)?;
        let descriptions = long.column(Self::DESCRIPTION)?.cast(&DataType::String)?;
        let year_values: Vec<(Year, Column)> = year_columns
            .iter()
            .map(|(year, name)| Ok((*year, long.column(name)?.cast(&DataType::String)?)))
            .collect::<PolarsResult<_>>()?;

        let mut by_state: BTreeMap<StateCode, BTreeMap<String, Option<f64>>> = BTreeMap::new();
        let mut columns = BTreeMap::new();
        let mut dropped = 0usize;

        for idx in 0..long.height() {
            let state = geo_fips.str()?.get(idx).and_then(parse_fips);
            let description = descriptions.str()?.get(idx).map(str::trim);
            let (Some(state), Some(description)) = (state, description) else {
                continue;
            };
            if !is_state_or_dc(state) || !geo.contains(state) {
                dropped += 1;
                continue;
            }

            let row = by_state.entry(state).or_default();
            for (year, values) in &year_values {
                let name = Self::column_name(description, *year);
                let value = values
                    .str()?
                    .get(idx)
                    .and_then(|s| s.trim().replace(',', "").parse::<f64>().ok());
                columns.insert((description.to_string(), *year), name.clone());
                row.insert(name, value);
            }
        }

        if dropped > 0 {
            debug!(dropped, "Economic rows outside the geographic reference dropped");
        }

        let states: Vec<StateCode> = by_state.keys().copied().collect();
        let mut frame_columns = vec![
            Column::new(Self::STATE_KEY.into(), states.clone()),
            Column::new(
                GeoReference::POSTAL.into(),
                states.iter().map(|s| geo.postal_code(*s).map(str::to_string)).collect::<Vec<_>>(),
            ),
            Column::new(
                GeoReference::NAME.into(),
                states.iter().map(|s| geo.state_name(*s).map(str::to_string)).collect::<Vec<_>>(),
            ),
        ];
        for name in columns.values() {
            let values: Vec<Option<f64>> = by_state
                .values()
                .map(|row| row.get(name).copied().flatten())
                .collect();
            frame_columns.push(Column::new(name.as_str().into(), values));
        }

        let frame = DataFrame::new(frame_columns)?;
        info!(states = frame.height(), variables = columns.len(), "Built economic panel");
        Ok(Self { frame, columns })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn states(&self) -> std::result::Result<Vec<StateCode>, PipelineError> {
        column_as_state(&self.frame, Self::STATE_KEY, "economic panel")
    }

    /// Column names for the given indicators in one year
    pub fn variables_for_year(
        &self,
        indicators: &[String],
        year: Year,
    ) -> std::result::Result<Vec<String>, PipelineError> {
        indicators
            .iter()
            .map(|indicator| {
                self.columns
                    .get(&(indicator.trim().to_string(), year))
                    .cloned()
                    .ok_or_else(|| PipelineError::MissingColumn {
                        context: format!("economic panel {}", year),
                        column: Self::column_name(indicator, year),
                    })
            })
            .collect()
    }
}

/// Question text and response codes per survey variable
#[derive(Debug, Clone, Default)]
pub struct QuestionGuide {
    questions: BTreeMap<String, Option<String>>,
    codes: BTreeMap<String, ResponseCodes>,
}

impl QuestionGuide {
    pub fn load_csv(path: &Path) -> Result<Self> {
        let df = read_table(path)?;
        Self::from_frame(&df).with_context(|| format!("Invalid question guide: {:?}", path))
    }

    /// Parse every `Response Code` cell; a malformed one aborts the load
    pub fn from_frame(df: &DataFrame) -> std::result::Result<Self, PipelineError> {
        require_columns(df, &["Variable", "Question", "Response Code"], "question guide")?;

        let variables = df.column("Variable")?.cast(&DataType::String)?;
        let questions = df.column("Question")?.cast(&DataType::String)?;
        let responses = df.column("Response Code")?.cast(&DataType::String)?;

        let mut guide = Self::default();
        for idx in 0..df.height() {
            let Some(variable) = variables.str()?.get(idx).map(str::trim) else {
                continue;
            };
            let question = questions.str()?.get(idx).map(str::to_string);
            guide.questions.insert(variable.to_string(), question);

            if let Some(raw) = responses.str()?.get(idx) {
                if guide.codes.contains_key(variable) {
                    warn!(variable, "Duplicate response codes in question guide; keeping first");
                    continue;
                }
                guide
                    .codes
                    .insert(variable.to_string(), ResponseCodes::parse(variable, raw)?);
            }
        }
        Ok(guide)
    }

    pub fn question(&self, variable: &str) -> Option<&str> {
        self.questions.get(variable).and_then(|q| q.as_deref())
    }

    pub fn response_codes(&self, variable: &str) -> Option<&ResponseCodes> {
        self.codes.get(variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> GeoReference {
        let df = df![
            "STATEFP" => &["01", "06", "11"],
            "STUSPS" => &["AL", "CA", "DC"],
            "NAME" => &["Alabama", "California", "District of Columbia"],
        ]
        .unwrap();
        GeoReference::from_frame(df).unwrap()
    }

    #[test]
    fn test_geo_reference_derives_numeric_key() {
        let geo = geo();
        assert_eq!(column_as_state(geo.frame(), "FIPSST", "test").unwrap(), vec![1, 6, 11]);
        assert_eq!(geo.postal_code(6), Some("CA"));
        assert_eq!(geo.state_for_postal("dc"), Some(11));
        assert!(!geo.contains(2));
    }

    #[test]
    fn test_geo_reference_accepts_integer_statefp() {
        let df = df![
            "STATEFP" => &[1i64, 6],
            "STUSPS" => &["AL", "CA"],
            "NAME" => &["Alabama", "California"],
        ]
        .unwrap();
        let geo = GeoReference::from_frame(df).unwrap();
        assert_eq!(geo.postal_code(1), Some("AL"));
    }

    #[test]
    fn test_economic_panel_pivots_and_cleans() {
        let long = df![
            "GeoFips" => &[" \"00000\"", " \"01000\"", " \"01000\"", " \"06000\"", " \"02000\""],
            "GeoName" => &["United States", "Alabama", "Alabama", "California", "Alaska"],
            "Description" => &["Real GDP", "Real GDP", "Per capita income", "Real GDP", "Real GDP"],
            "2022" => &["100", "10", "(NA)", "50", "7"],
            "2023" => &["110", "11", "45000", "(D)", "8"],
        ]
        .unwrap();

        let panel = EconomicPanel::from_long(&long, &geo()).unwrap();
        // US total and Alaska (absent from reference) dropped
        assert_eq!(panel.states().unwrap(), vec![1, 6]);

        let cols = panel
            .variables_for_year(&["Real GDP".to_string(), "Per capita income".to_string()], 2023)
            .unwrap();
        let gdp = crate::utils::column_as_f64(panel.frame(), &cols[0], "test").unwrap();
        assert_eq!(gdp, vec![Some(11.0), None]);
        let income = crate::utils::column_as_f64(panel.frame(), &cols[1], "test").unwrap();
        assert_eq!(income, vec![Some(45000.0), None]);

        assert!(panel.variables_for_year(&["Real GDP".to_string()], 2019).is_err());
    }

    #[test]
    fn test_question_guide_parses_codes() {
        let df = df![
            "Variable" => &["K2Q01", "FWC"],
            "Question" => &[Some("General health"), None],
            "Response Code" => &[Some("1 = Excellent; 2 = Very good"), None],
        ]
        .unwrap();

        let guide = QuestionGuide::from_frame(&df).unwrap();
        assert_eq!(guide.question("K2Q01"), Some("General health"));
        assert_eq!(guide.response_codes("K2Q01").unwrap().label(1).unwrap(), "Excellent");
        assert!(guide.response_codes("FWC").is_none());
    }

    #[test]
    fn test_question_guide_rejects_malformed_codes() {
        let df = df![
            "Variable" => &["K2Q01"],
            "Question" => &["General health"],
            "Response Code" => &["1 - Excellent"],
        ]
        .unwrap();

        assert!(matches!(
            QuestionGuide::from_frame(&df),
            Err(PipelineError::MalformedResponseCode { .. })
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatasetRegistry::new();
        registry.insert(
            2022,
            df![
                "FIPSST" => &[1i64, 2],
                "K2Q01" => &[1.0, 3.0],
                "FORMTYPE" => &["T1", "T3"],
            ]
            .unwrap(),
        );

        registry.write_snapshot(dir.path()).unwrap();
        let back = DatasetRegistry::read_snapshot(dir.path(), &[2022]).unwrap();
        assert!(back.get(2022).unwrap().equals(registry.get(2022).unwrap()));
        assert!(matches!(back.get(2021), Err(PipelineError::MissingYear(2021))));
    }

    #[test]
    fn test_loaders_read_csv_files() {
        let dir = tempfile::tempdir().unwrap();

        let geo_path = dir.path().join("states.csv");
        std::fs::write(
            &geo_path,
            "STATEFP,STUSPS,NAME\n\"01\",AL,Alabama\n\"06\",CA,California\n",
        )
        .unwrap();
        let bea_path = dir.path().join("bea.csv");
        std::fs::write(
            &bea_path,
            concat!(
                "GeoFips,GeoName,LineCode,Description,2022,2023\n",
                "\"00000\",United States,1,Real GDP,\"1,000\",1100\n",
                "\"01000\",Alabama,1,Real GDP,10,(NA)\n",
                "\"06000\",California,1,Real GDP,\"2,500\",2600\n",
            ),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("nsch_2022e_topical.csv"),
            "FIPSST,FWC,FORMTYPE,K2Q01\n1,120.5,T1,2\n6,80.0,T3,\n6,95.0,T2,NA\n",
        )
        .unwrap();

        let geo = GeoReference::load_csv(&geo_path).unwrap();
        assert_eq!(geo.postal_code(6), Some("CA"));

        let panel = EconomicPanel::load_csv(&bea_path, &geo).unwrap();
        assert_eq!(panel.states().unwrap(), vec![1, 6]);
        let cols = panel.variables_for_year(&["Real GDP".to_string()], 2022).unwrap();
        let gdp = crate::utils::column_as_f64(panel.frame(), &cols[0], "test").unwrap();
        assert_eq!(gdp, vec![Some(10.0), Some(2500.0)]);
        let cols = panel.variables_for_year(&["Real GDP".to_string()], 2023).unwrap();
        let gdp = crate::utils::column_as_f64(panel.frame(), &cols[0], "test").unwrap();
        assert_eq!(gdp, vec![None, Some(2600.0)]);

        let raw = DatasetRegistry::load_raw(dir.path(), &[2022]).unwrap();
        let table = raw.get(2022).unwrap();
        assert_eq!(table.shape(), (3, 4));
        assert_eq!(table.column("K2Q01").unwrap().null_count(), 2);
        assert!(DatasetRegistry::load_raw(dir.path(), &[2021]).is_err());
    }
}
