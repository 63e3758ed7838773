use std::path::Path;

use electoral_systems::{CandidateId, Registry};

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Identifiers for the ballots of a file that has no id column.
pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

/// Resolves a cell of a ballot file: either the name or the id of a candidate.
///
/// Names take precedence, so that a candidate may be called "1".
pub fn lookup_candidate(registry: &Registry, cell: &str) -> Option<CandidateId> {
    if let Some(c) = registry.candidates().iter().find(|c| c.name == cell) {
        return Some(c.id);
    }
    cell.parse::<u32>()
        .ok()
        .map(CandidateId)
        .filter(|cid| registry.contains(*cid))
}
