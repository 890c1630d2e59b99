//! Extra-specs match grammar and host metadata helpers.

use indexmap::{IndexMap, IndexSet};

use crate::core::common::{GroupType, Level};
use crate::core::snapshot::{HostResource, PlacementState};

/// Matches one aggregate metadata value against an extra-specs requirement.
///
/// Supported operations: numeric `=` (meaning >=), `==`, `!=`, `>=`, `<=`;
/// string `s==`, `s!=`, `s<`, `s<=`, `s>`, `s>=`; substring `<in>`;
/// `<all-in>`; and the disjunction `<or> v1 <or> v2 ...`. A requirement not
/// starting with a known operation falls back to whole-string equality.
/// Non-numeric operands of a numeric operation fail the match.
pub fn match_extra_spec(value: &str, req: &str) -> bool {
    let mut words: Vec<&str> = req.split_whitespace().collect();
    if words.is_empty() {
        return value == req;
    }
    let op = words.remove(0);

    match op {
        "<or>" => {
            // Alternating value / <or> keyword tokens.
            let mut iter = words.into_iter();
            while let Some(alt) = iter.next() {
                if alt == value {
                    return true;
                }
                if iter.next().is_none() {
                    break;
                }
            }
            false
        }
        "<in>" => words.first().map_or(false, |w| value.contains(w)),
        "<all-in>" => !words.is_empty() && words.iter().all(|w| value.contains(w)),
        "=" | "==" | "!=" | ">=" | "<=" => match words.first() {
            Some(w) => match_numeric(op, value, w),
            None => false,
        },
        "s==" | "s!=" | "s<" | "s<=" | "s>" | "s>=" => match words.first() {
            Some(w) => match_string(op, value, w),
            None => false,
        },
        _ => value == req,
    }
}

fn match_numeric(op: &str, value: &str, operand: &str) -> bool {
    let (x, y) = match (value.trim().parse::<f64>(), operand.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => (x, y),
        _ => return false,
    };
    match op {
        "=" => x >= y,
        "==" => x == y,
        "!=" => x != y,
        ">=" => x >= y,
        "<=" => x <= y,
        _ => false,
    }
}

fn match_string(op: &str, value: &str, operand: &str) -> bool {
    match op {
        "s==" => value == operand,
        "s!=" => value != operand,
        "s<" => value < operand,
        "s<=" => value <= operand,
        "s>" => value > operand,
        "s>=" => value >= operand,
        _ => false,
    }
}

/// Metadata of every host-aggregate the candidate belongs to at this level,
/// with values comma-split and trimmed into sets.
pub fn aggregate_metadata_by_host(
    level: Level,
    host: &HostResource,
    state: &PlacementState,
) -> IndexMap<String, IndexMap<String, IndexSet<String>>> {
    let mut metadatas = IndexMap::new();

    for (gk, gt) in host.memberships(level) {
        if *gt != GroupType::Aggregate {
            continue;
        }
        let Some(g) = state.groups.get(gk) else {
            continue;
        };

        let mut metadata: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for (k, v) in &g.metadata {
            // prior_metadata nests a mapping of superseded values, not
            // matchable strings, so it is not folded into the sets.
            if k == "prior_metadata" {
                continue;
            }
            metadata
                .entry(k.clone())
                .or_default()
                .extend(v.split(',').map(|x| x.trim().to_string()));
        }
        metadatas.insert(gk.clone(), metadata);
    }

    metadatas
}

/// Availability zone names the candidate belongs to at this level. A group
/// named "az:nova" yields "nova".
pub fn availability_zones_by_host(level: Level, host: &HostResource) -> Vec<String> {
    let mut zones = Vec::new();

    for (gk, gt) in host.memberships(level) {
        if *gt == GroupType::Az {
            let name = match gk.split_once(':') {
                Some((_, rest)) => rest,
                None => gk.as_str(),
            };
            zones.push(name.to_string());
        }
    }

    zones
}
