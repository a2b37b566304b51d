//! Parser for the leaf-node client log format.

use crate::{LogEvent, EVENT_MARKER, FAILURE_MARKER, OBTAIN_MARKER, REMOVE_MARKER, SEARCH_MARKER};
use anyhow::{bail, Result};

/// Classifies one raw log line.
///
/// Returns `Ok(None)` for lines that are not evaluation records: plain
/// diagnostics, and marked lines whose record type we don't recognize.
/// Returns `Err` for a candidate record whose token shape is broken --
/// the producing node is trusted to write well-formed records, so a
/// malformed one means the whole log is unusable.
pub fn parse_line(line: &str) -> Result<Option<LogEvent>> {
    // 1. A failure marker anywhere on the line wins, before any shape checks.
    if line.contains(FAILURE_MARKER) {
        return Ok(Some(LogEvent::Failed));
    }

    // 2. Everything else must announce itself with the event marker.
    if !line.starts_with(EVENT_MARKER) {
        return Ok(None);
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();

    if line.contains(OBTAIN_MARKER) {
        let resource = last_resource_token(&tokens, line)?;
        Ok(Some(LogEvent::Obtained { resource }))
    } else if line.contains(SEARCH_MARKER) {
        // The record ends in `[total]` `[i1,i2,...]`: the second-to-last
        // token is the fragment denominator, the last is the hit list.
        if tokens.len() < 3 {
            bail!("search record too short: \"{}\"", line);
        }
        let raw_tail = tokens[tokens.len() - 1];
        let total = strip_brackets(tokens[tokens.len() - 2], line)?;
        let results = strip_brackets(raw_tail, line)?
            .split(',')
            .map(|fragment| format!("[{}/{}]", fragment, total))
            .collect();
        Ok(Some(LogEvent::Searched {
            results,
            raw_tail: raw_tail.to_string(),
        }))
    } else if line.contains(REMOVE_MARKER) {
        let resource = last_resource_token(&tokens, line)?;
        Ok(Some(LogEvent::Removed { resource }))
    } else {
        // Marked, but an operation we don't track (the log format grows
        // record types faster than the analyzer cares about).
        Ok(None)
    }
}

/// The resource named by a download or removal record is its final token.
fn last_resource_token(tokens: &[&str], line: &str) -> Result<String> {
    // The first token carries the marker, so a real record has at least two.
    if tokens.len() < 2 {
        bail!("record carries no resource token: \"{}\"", line);
    }
    Ok(tokens[tokens.len() - 1].to_string())
}

fn strip_brackets<'a>(token: &'a str, line: &str) -> Result<&'a str> {
    match token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        Some(inner) => Ok(inner),
        None => bail!("expected bracketed token \"{}\" in \"{}\"", token, line),
    }
}
