// Primitives for reading CSV files.

use std::fs::File;

use electoral_systems::{Ballot, Registry};
use log::debug;
use snafu::prelude::*;

use crate::election::{
    io_common::{lookup_candidate, make_default_id},
    *,
};

/// Reads one ballot per row.
///
/// The cells from the first vote column onwards are the preferences, most
/// preferred first. Empty cells are skipped.
pub fn read_csv_ranking(
    path: String,
    cfs: &FileSource,
    registry: &Registry,
) -> ElectionResult<Vec<Ballot>> {
    let default_id = make_default_id(&path);

    let id_idx_o = cfs.id_column_index_int()?;
    let choices_start_col = cfs.first_vote_column_index()?;
    let count_idx_o = cfs.count_column_index_int()?;

    let mut res: Vec<Ballot> = Vec::new();
    let (records, row_offset) = get_records(&path, cfs)?;

    for (idx, line_r) in records.enumerate() {
        let lineno = idx + row_offset + 1;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let id = if let Some(id_idx) = id_idx_o {
            line.get(id_idx)
                .context(CsvLineTooShortSnafu { lineno })?
                .to_string()
        } else {
            default_id(lineno)
        };

        let count: u64 = if let Some(count_idx) = count_idx_o {
            let cell = line
                .get(count_idx)
                .context(CsvLineTooShortSnafu { lineno })?
                .trim();
            cell.parse::<u64>().ok().context(CsvCountSnafu {
                lineno,
                value: cell.to_string(),
            })?
        } else {
            1
        };

        let mut preferences: Vec<u32> = Vec::new();
        for cell in line.iter().skip(choices_start_col).map(|s| s.trim()) {
            if cell.is_empty() {
                continue;
            }
            let cid = lookup_candidate(registry, cell).context(CsvUnknownCandidateSnafu {
                name: cell.to_string(),
                ballot: id.clone(),
                lineno,
            })?;
            preferences.push(cid.0);
        }
        debug!(
            "read_csv_ranking: lineno: {:?} id: {:?} count: {} preferences: {:?}",
            lineno, id, count, preferences
        );
        res.push(Ballot::new(&preferences, count));
    }
    Ok(res)
}

fn get_records(
    path: &str,
    cfs: &FileSource,
) -> ElectionResult<(csv::StringRecordsIntoIter<File>, usize)> {
    let first_row = cfs.first_vote_row_index()?;
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();
    for _ in 0..first_row {
        _ = records.next();
    }
    Ok((records, first_row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use electoral_systems::{Candidate, CandidateId, PartyId};
    use serde_json::json;
    use std::io::Write;

    fn registry() -> Registry {
        let c = |id: u32, name: &str| Candidate {
            id: CandidateId(id),
            name: name.to_string(),
            party_id: PartyId(1),
            party_name: "P".to_string(),
            color: "#000".to_string(),
        };
        Registry::new(vec![c(1, "Anna"), c(2, "Bob"), c(3, "Clara")], vec![]).unwrap()
    }

    fn write_file(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.display().to_string()
    }

    #[test]
    fn counts_and_names() {
        let path = write_file(
            "elecsim_io_csv_counts.csv",
            "id,count,choice 1,choice 2,choice 3\na,20,Anna,Bob,\nb,5,3,,Anna\n",
        );
        let cfs: FileSource = serde_json::from_value(json!({
            "provider": "csv",
            "filePath": path,
            "idColumnIndex": 1,
            "countColumnIndex": 2,
            "firstVoteColumnIndex": 3,
            "firstVoteRowIndex": 2
        }))
        .unwrap();
        let ballots = read_csv_ranking(path, &cfs, &registry()).unwrap();
        assert_eq!(ballots, vec![Ballot::new(&[1, 2], 20), Ballot::new(&[3, 1], 5)]);
    }

    #[test]
    fn unknown_candidate() {
        let path = write_file("elecsim_io_csv_unknown.csv", "Anna,Zoe\n");
        let res = read_csv_ranking(path.clone(), &FileSource::csv(&path), &registry());
        assert!(matches!(
            res,
            Err(ElectionError::CsvUnknownCandidate { lineno: 1, .. })
        ));
    }

    #[test]
    fn bad_count() {
        let path = write_file("elecsim_io_csv_count.csv", "x,Anna\n");
        let cfs: FileSource = serde_json::from_value(json!({
            "provider": "csv",
            "filePath": path,
            "countColumnIndex": 1,
            "firstVoteColumnIndex": 2
        }))
        .unwrap();
        assert!(matches!(
            read_csv_ranking(path, &cfs, &registry()),
            Err(ElectionError::CsvCount { lineno: 1, .. })
        ));
    }
}
