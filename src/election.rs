use log::{debug, info, warn};

use electoral_systems::*;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::election::config_reader::*;
use crate::election::io_csv::read_csv_ranking;

pub mod config_reader;
mod io_common;
mod io_csv;

#[derive(Debug, Snafu)]
pub enum ElectionError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Expected a positive number in the configuration"))]
    ParsingJsonNumber {},
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}: {source}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno}: {source}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("Line {lineno}: {value:?} is not a ballot count"))]
    CsvCount { lineno: usize, value: String },
    #[snafu(display("Line {lineno} (ballot {ballot}): unknown candidate {name:?}"))]
    CsvUnknownCandidate {
        name: String,
        ballot: String,
        lineno: usize,
    },
    #[snafu(display("Missing parent directory"))]
    MissingParentDir {},
    #[snafu(display("The configuration has no {section} for method {method}"))]
    MissingSection { section: String, method: String },
    #[snafu(display("Unsupported {option}: {value:?}"))]
    UnsupportedOption { option: String, value: String },
    #[snafu(display("Tabulation failed: {source}"))]
    Tabulation { source: VotingErrors },
    #[snafu(display("Difference detected between the summary and the reference summary {path}"))]
    ReferenceMismatch { path: String },
}

pub type ElectionResult<T> = Result<T, ElectionError>;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Method {
    Stv,
    Borda,
    Condorcet,
    PartyList,
    Mmp,
    Parallel,
}

impl Method {
    fn parse(s: &str) -> ElectionResult<Method> {
        match s {
            "stv" => Ok(Method::Stv),
            "borda" => Ok(Method::Borda),
            "condorcet" => Ok(Method::Condorcet),
            "partyList" => Ok(Method::PartyList),
            "mmp" => Ok(Method::Mmp),
            "parallel" => Ok(Method::Parallel),
            x => UnsupportedOptionSnafu {
                option: "method",
                value: x,
            }
            .fail(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Method::Stv => "stv",
            Method::Borda => "borda",
            Method::Condorcet => "condorcet",
            Method::PartyList => "partyList",
            Method::Mmp => "mmp",
            Method::Parallel => "parallel",
        }
    }
}

// ******** Rules ********

fn validate_tiebreak(rules: &ElectionRules) -> ElectionResult<TieBreakMode> {
    match rules.tiebreak_mode.as_deref() {
        None | Some("lowestId") => Ok(TieBreakMode::LowestId),
        Some("useCandidateOrder") => Ok(TieBreakMode::UseCandidateOrder),
        Some("random") => {
            let seed = match &rules.random_seed {
                Some(JSValue::Number(n)) => n.as_u64().and_then(|x| u32::try_from(x).ok()),
                Some(JSValue::String(s)) => s.parse::<u32>().ok(),
                _ => None,
            };
            let seed = seed.context(UnsupportedOptionSnafu {
                option: "randomSeed",
                value: format!("{:?}", rules.random_seed),
            })?;
            Ok(TieBreakMode::Random(seed))
        }
        Some(x) => UnsupportedOptionSnafu {
            option: "tiebreakMode",
            value: x,
        }
        .fail(),
    }
}

fn validate_allocation_method(rules: &ElectionRules) -> ElectionResult<AllocationMethod> {
    match rules.allocation_method.as_deref() {
        None | Some("dhondt") => Ok(AllocationMethod::DHondt),
        Some("sainteLague") => Ok(AllocationMethod::SainteLague),
        Some(x) => UnsupportedOptionSnafu {
            option: "allocationMethod",
            value: x,
        }
        .fail(),
    }
}

fn validate_stv_rules(rules: &ElectionRules) -> ElectionResult<StvRules> {
    let defaults = StvRules::DEFAULT_RULES;
    Ok(StvRules {
        seats: rules.seats.unwrap_or(defaults.seats),
        tiebreak_mode: validate_tiebreak(rules)?,
        max_rounds: rules.max_rounds.unwrap_or(defaults.max_rounds),
        fail_on_round_limit: rules
            .fail_on_round_limit
            .unwrap_or(defaults.fail_on_round_limit),
    })
}

fn validate_allocation_rules(rules: &ElectionRules) -> ElectionResult<AllocationRules> {
    Ok(AllocationRules {
        seats: rules.seats.unwrap_or(AllocationRules::DEFAULT_RULES.seats),
        method: validate_allocation_method(rules)?,
        threshold: rules.threshold.unwrap_or(0.0),
        tiebreak_mode: validate_tiebreak(rules)?,
    })
}

fn validate_multi_district_rules(
    rules: &ElectionRules,
    mode: AssemblyMode,
) -> ElectionResult<MultiDistrictRules> {
    Ok(MultiDistrictRules {
        mode,
        list_seats: rules.list_seats.unwrap_or(0),
        method: validate_allocation_method(rules)?,
        threshold: rules.threshold.unwrap_or(0.0),
        tiebreak_mode: validate_tiebreak(rules)?,
    })
}

// ******** Input data ********

fn read_ranking_data(
    path: PathBuf,
    cfs: &FileSource,
    registry: &Registry,
) -> ElectionResult<Vec<Ballot>> {
    let p = path.as_path().display().to_string();
    info!("Attempting to read rank file {:?}", p);
    match cfs.provider.as_str() {
        "csv" => read_csv_ranking(p, cfs, registry),
        x => UnsupportedOptionSnafu {
            option: "provider",
            value: x,
        }
        .fail(),
    }
}

/// The ballots listed in the configuration, then the ones of the ballot files.
/// An input file given on the command line replaces the configured files.
fn load_ballots(
    config: &ElectionConfig,
    root_p: &Path,
    input_path: &Option<String>,
    registry: &Registry,
    method: Method,
) -> ElectionResult<BallotSet> {
    let mut ballots: BallotSet = config.ballots.clone().unwrap_or_default().into_iter().collect();
    match input_path {
        Some(input) => {
            let cfs = match config.ballot_sources.first() {
                Some(template) => template.with_file_path(input),
                None => FileSource::csv(input),
            };
            for b in read_ranking_data(PathBuf::from(input), &cfs, registry)? {
                ballots.push(b);
            }
        }
        None => {
            ensure!(
                config.ballots.is_some() || !config.ballot_sources.is_empty(),
                MissingSectionSnafu {
                    section: "ballots",
                    method: method.name(),
                }
            );
            for cfs in config.ballot_sources.iter() {
                let p: PathBuf = [root_p, Path::new(&cfs.file_path)].iter().collect();
                for b in read_ranking_data(p, cfs, registry)? {
                    ballots.push(b);
                }
            }
        }
    }
    Ok(ballots)
}

fn party_votes(config: &ElectionConfig, method: Method) -> ElectionResult<&BTreeMap<PartyId, u64>> {
    config.party_votes.as_ref().context(MissingSectionSnafu {
        section: "partyVotes",
        method: method.name(),
    })
}

fn districts(config: &ElectionConfig, method: Method) -> ElectionResult<&[District]> {
    let districts = config.districts.as_deref().unwrap_or_default();
    ensure!(
        !districts.is_empty(),
        MissingSectionSnafu {
            section: "districts",
            method: method.name(),
        }
    );
    Ok(districts)
}

// ******** Tabulation ********

fn build_summary_js(config: &ElectionConfig, method: Method, results: JSValue) -> JSValue {
    let c = OutputConfig {
        contest: config.output_settings.contest_name.clone(),
        date: config.output_settings.contest_date.clone(),
        jurisdiction: config.output_settings.contest_jurisdiction.clone(),
        office: config.output_settings.contest_office.clone(),
        method: method.name().to_string(),
    };
    json!({
        "config": c,
        "results": results })
}

/// Runs the election described in a configuration file and returns the summary.
pub fn tabulate_election(
    config_path: String,
    input_path: Option<String>,
    method_override: Option<String>,
) -> ElectionResult<JSValue> {
    let config_p = Path::new(config_path.as_str());
    let config_str = fs::read_to_string(config_path.clone()).context(OpeningJsonSnafu {
        path: config_path.clone(),
    })?;
    let config: ElectionConfig = serde_json::from_str(&config_str).context(ParsingJsonSnafu {})?;
    debug!("config: {:?}", config);

    let method_name = method_override
        .or_else(|| config.method.clone())
        .context(MissingSectionSnafu {
            section: "method",
            method: "(none)",
        })?;
    let method = Method::parse(method_name.as_str())?;
    info!(
        "Running {:?} for contest {:?}",
        method, config.output_settings.contest_name
    );

    let registry =
        Registry::new(config.candidates.clone(), config.parties.clone()).context(TabulationSnafu {})?;
    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    let results: JSValue = match method {
        Method::Stv => {
            let rules = validate_stv_rules(&config.rules)?;
            let ballots = load_ballots(&config, root_p, &input_path, &registry, method)?;
            let res = run_stv(&registry, &ballots, &rules).context(TabulationSnafu {})?;
            if res.status == TabulationStatus::RoundLimitReached {
                warn!("The count stopped after {} rounds", res.rounds.len());
            }
            serde_json::to_value(res).context(ParsingJsonSnafu {})?
        }
        Method::Borda => {
            let tiebreak_mode = validate_tiebreak(&config.rules)?;
            let ballots = load_ballots(&config, root_p, &input_path, &registry, method)?;
            let res = score_borda(&registry, &ballots, tiebreak_mode).context(TabulationSnafu {})?;
            serde_json::to_value(res).context(ParsingJsonSnafu {})?
        }
        Method::Condorcet => {
            let ballots = load_ballots(&config, root_p, &input_path, &registry, method)?;
            let res = resolve_condorcet(&registry, &ballots).context(TabulationSnafu {})?;
            serde_json::to_value(res).context(ParsingJsonSnafu {})?
        }
        Method::PartyList => {
            let rules = validate_allocation_rules(&config.rules)?;
            let res = run_party_list(&registry, party_votes(&config, method)?, &rules)
                .context(TabulationSnafu {})?;
            serde_json::to_value(res).context(ParsingJsonSnafu {})?
        }
        Method::Mmp | Method::Parallel => {
            let mode = if method == Method::Mmp {
                AssemblyMode::Mmp
            } else {
                AssemblyMode::Parallel
            };
            let rules = validate_multi_district_rules(&config.rules, mode)?;
            let res = run_multi_district(
                &registry,
                districts(&config, method)?,
                party_votes(&config, method)?,
                &rules,
            )
            .context(TabulationSnafu {})?;
            serde_json::to_value(res).context(ParsingJsonSnafu {})?
        }
    };

    Ok(build_summary_js(&config, method, results))
}

pub fn run_election(
    config_path: String,
    input_path: Option<String>,
    method_override: Option<String>,
    out_path: Option<String>,
    check_summary_path: Option<String>,
) -> ElectionResult<()> {
    let result_js = tabulate_election(config_path, input_path, method_override)?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;

    match out_path.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            info!("Writing the summary to {:?}", path);
            fs::write(path, pretty_js_stats.as_bytes()).context(WritingSummarySnafu { path })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p.clone())?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu { path: summary_p }.fail();
        }
        info!("The summary matches the reference {:?}", summary_p);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(test_name: &str, file_name: &str) -> String {
        format!(
            "{}/tests/data/{}/{}",
            env!("CARGO_MANIFEST_DIR"),
            test_name,
            file_name
        )
    }

    fn test_wrapper(test_name: &str) {
        let res = run_election(
            test_path(test_name, &format!("{}_config.json", test_name)),
            None,
            None,
            None,
            Some(test_path(
                test_name,
                &format!("{}_expected_summary.json", test_name),
            )),
        );
        if let Err(e) = &res {
            eprintln!("An error occured {}", e);
        }
        assert!(res.is_ok());
    }

    #[test]
    fn stv_council() {
        test_wrapper("stv_council");
    }

    #[test]
    fn borda_csv() {
        test_wrapper("borda_csv");
    }

    #[test]
    fn condorcet_cycle() {
        test_wrapper("condorcet_cycle");
    }

    #[test]
    fn party_list() {
        test_wrapper("party_list");
    }

    #[test]
    fn mmp_overhang() {
        test_wrapper("mmp_overhang");
    }

    #[test]
    fn unknown_candidate() {
        let res = tabulate_election(
            test_path("unknown_candidate", "unknown_candidate_config.json"),
            None,
            None,
        );
        assert!(matches!(
            res,
            Err(ElectionError::Tabulation {
                source: VotingErrors::UnknownReference { .. }
            })
        ));
    }

    #[test]
    fn method_override() {
        let config = test_path("condorcet_cycle", "condorcet_cycle_config.json");
        let borda = tabulate_election(config.clone(), None, Some("borda".to_string())).unwrap();
        assert_eq!(borda["config"]["method"], json!("borda"));
        assert_eq!(borda["results"]["total_points"], json!(825));

        assert!(matches!(
            tabulate_election(config.clone(), None, Some("mmp".to_string())),
            Err(ElectionError::MissingSection { .. })
        ));
        assert!(matches!(
            tabulate_election(config, None, Some("approval".to_string())),
            Err(ElectionError::UnsupportedOption { .. })
        ));
    }

    #[test]
    fn input_override() {
        let res = tabulate_election(
            test_path("borda_csv", "borda_csv_config.json"),
            Some(test_path("borda_csv", "ballots.csv")),
            None,
        )
        .unwrap();
        assert_eq!(res["results"]["winner"], json!(2));
    }

    #[test]
    fn reference_floats_round_trip() {
        let values: Vec<f64> = (1..200).map(|k| k as f64 / 54.0 + 1.0 / 7.0 * k as f64).collect();
        let summary = json!({ "results": values });
        let pretty = serde_json::to_string_pretty(&summary).unwrap();
        let back: JSValue = serde_json::from_str(&pretty).unwrap();
        assert_eq!(back, summary);
        assert_eq!(serde_json::to_string_pretty(&back).unwrap(), pretty);
    }

    #[test]
    fn rules() {
        let rules = ElectionRules {
            tiebreak_mode: Some("random".to_string()),
            random_seed: Some(json!("42")),
            seats: Some(3),
            ..ElectionRules::default()
        };
        let stv = validate_stv_rules(&rules).unwrap();
        assert_eq!(stv.tiebreak_mode, TieBreakMode::Random(42));
        assert_eq!(stv.seats, 3);
        assert_eq!(stv.max_rounds, 100);

        let no_seed = ElectionRules {
            tiebreak_mode: Some("random".to_string()),
            ..ElectionRules::default()
        };
        assert!(validate_tiebreak(&no_seed).is_err());

        let sl = ElectionRules {
            allocation_method: Some("sainteLague".to_string()),
            ..ElectionRules::default()
        };
        assert_eq!(
            validate_allocation_method(&sl).unwrap(),
            AllocationMethod::SainteLague
        );
        let unknown = ElectionRules {
            allocation_method: Some("hare".to_string()),
            ..ElectionRules::default()
        };
        assert!(validate_allocation_method(&unknown).is_err());
    }
}
