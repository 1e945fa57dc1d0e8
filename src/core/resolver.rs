/// Map a user-supplied PID or name fragments to exactly one process

use std::fmt;
use thiserror::Error;

/// Candidates listed in an ambiguous-match error
const MAX_LISTED_CANDIDATES: usize = 8;

/// The process being monitored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
}

impl ProcessHandle {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.name, self.pid)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no process found matching '{0}'")]
    NotFound(String),

    #[error("{count} processes match, be more specific:{}", format_candidates(.candidates, .count))]
    Ambiguous {
        count: usize,
        candidates: Vec<ProcessHandle>,
    },
}

fn format_candidates(candidates: &[ProcessHandle], count: &usize) -> String {
    let count = *count;
    let mut out: String = candidates
        .iter()
        .take(MAX_LISTED_CANDIDATES)
        .map(|p| format!("\n  {:>8}  {}", p.pid, p.name))
        .collect();
    if count > MAX_LISTED_CANDIDATES {
        out.push_str(&format!("\n  ... and {} more", count - MAX_LISTED_CANDIDATES));
    }
    out
}

/// Processes whose name contains every filter, case-insensitively, sorted by PID
pub fn filter_by_name<I>(filters: &[&str], processes: I) -> Vec<ProcessHandle>
where
    I: IntoIterator<Item = ProcessHandle>,
{
    let needles: Vec<String> = filters.iter().map(|f| f.to_lowercase()).collect();
    let mut matches: Vec<ProcessHandle> = processes
        .into_iter()
        .filter(|p| {
            let name = p.name.to_lowercase();
            needles.iter().all(|n| name.contains(n.as_str()))
        })
        .collect();
    matches.sort_by_key(|p| p.pid);
    matches
}

/// Resolve `token` (plus any extra name filters) against a process table.
///
/// A token that parses as an integer is only ever matched as an exact PID.
/// Anything else is a name filter and must match exactly one process.
pub fn resolve<I, S>(token: &str, extra_filters: &[S], processes: I) -> Result<ProcessHandle, ResolveError>
where
    I: IntoIterator<Item = ProcessHandle>,
    S: AsRef<str>,
{
    if let Ok(pid) = token.trim().parse::<i64>() {
        return processes
            .into_iter()
            .find(|p| i64::from(p.pid) == pid)
            .ok_or_else(|| ResolveError::NotFound(token.to_string()));
    }

    let filters: Vec<&str> = std::iter::once(token)
        .chain(extra_filters.iter().map(|f| f.as_ref()))
        .collect();

    let mut matches = filter_by_name(&filters, processes);
    match matches.len() {
        0 => Err(ResolveError::NotFound(token.to_string())),
        1 => Ok(matches.remove(0)),
        count => Err(ResolveError::Ambiguous {
            count,
            candidates: matches,
        }),
    }
}
