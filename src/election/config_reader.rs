use std::collections::BTreeMap;
use std::fs;

use electoral_systems::{Ballot, Candidate, District, Party, PartyId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use snafu::prelude::*;

use crate::election::*;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "contestName")]
    pub contest_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "contestDate")]
    pub contest_date: Option<String>,
    #[serde(rename = "contestJurisdiction")]
    pub contest_jurisdiction: Option<String>,
    #[serde(rename = "contestOffice")]
    pub contest_office: Option<String>,
}

/// The header of the summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub contest: String,
    pub date: Option<String>,
    pub jurisdiction: Option<String>,
    pub office: Option<String>,
    pub method: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "firstVoteColumnIndex")]
    _first_vote_column_index: Option<JSValue>,
    #[serde(rename = "firstVoteRowIndex")]
    _first_vote_row_index: Option<JSValue>,
    #[serde(rename = "idColumnIndex")]
    pub id_column_index: Option<JSValue>,
    #[serde(rename = "countColumnIndex")]
    pub count_column_index: Option<JSValue>,
}

// All the indexes are 1-based in the configuration and 0-based in the code.
impl FileSource {
    /// A CSV file with only the preferences, starting at the first row.
    pub fn csv(file_path: &str) -> FileSource {
        FileSource {
            provider: "csv".to_string(),
            file_path: file_path.to_string(),
            _first_vote_column_index: None,
            _first_vote_row_index: None,
            id_column_index: None,
            count_column_index: None,
        }
    }

    /// The same layout, for another file.
    pub fn with_file_path(&self, file_path: &str) -> FileSource {
        FileSource {
            file_path: file_path.to_string(),
            ..self.clone()
        }
    }

    pub fn first_vote_column_index(&self) -> ElectionResult<usize> {
        match self._first_vote_column_index {
            Some(_) => read_js_int(&self._first_vote_column_index),
            None => Ok(0),
        }
    }

    pub fn first_vote_row_index(&self) -> ElectionResult<usize> {
        match self._first_vote_row_index {
            Some(_) => read_js_int(&self._first_vote_row_index),
            None => Ok(0),
        }
    }

    pub fn id_column_index_int(&self) -> ElectionResult<Option<usize>> {
        if self.id_column_index.is_some() {
            read_js_int(&self.id_column_index).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn count_column_index_int(&self) -> ElectionResult<Option<usize>> {
        if self.count_column_index.is_some() {
            read_js_int(&self.count_column_index).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// The rules, as written in the configuration. Only the ones that apply to
/// the chosen method are read.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElectionRules {
    pub seats: Option<u32>,
    #[serde(rename = "tiebreakMode")]
    pub tiebreak_mode: Option<String>,
    #[serde(rename = "randomSeed")]
    pub random_seed: Option<JSValue>,
    #[serde(rename = "maxRounds")]
    pub max_rounds: Option<u32>,
    #[serde(rename = "failOnRoundLimit")]
    pub fail_on_round_limit: Option<bool>,
    #[serde(rename = "allocationMethod")]
    pub allocation_method: Option<String>,
    pub threshold: Option<f64>,
    #[serde(rename = "listSeats")]
    pub list_seats: Option<u32>,
    #[serde(rename = "rulesDescription")]
    pub rules_description: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    pub method: Option<String>,
    #[serde(default)]
    pub rules: ElectionRules,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub parties: Vec<Party>,
    pub ballots: Option<Vec<Ballot>>,
    #[serde(rename = "ballotSources", default)]
    pub ballot_sources: Vec<FileSource>,
    pub districts: Option<Vec<District>>,
    #[serde(rename = "partyVotes")]
    pub party_votes: Option<BTreeMap<PartyId, u64>>,
}

pub fn read_summary(path: String) -> ElectionResult<JSValue> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// Reads a 1-based index, as a number, a string of digits or a spreadsheet
/// column letter, and returns it 0-based.
fn read_js_int(x: &Option<JSValue>) -> ElectionResult<usize> {
    let idx = match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {})?,
        Some(JSValue::String(s)) if s.len() == 1 && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            let c = s.to_ascii_lowercase().chars().next().context(ParsingJsonNumberSnafu {})?;
            (c as usize) - ('a' as usize) + 1
        }
        Some(JSValue::String(s)) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {})?,
        _ => return ParsingJsonNumberSnafu {}.fail(),
    };
    ensure!(idx >= 1, ParsingJsonNumberSnafu {});
    Ok(idx - 1)
}
