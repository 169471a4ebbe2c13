use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::JobStatus;
use crate::filter::{FilterExpression, FilterTerm};

/// Returns `true` if `status` satisfies every expression of `filter`.
///
/// An empty filter matches everything. Terms naming a field the status
/// does not carry never match, regardless of negation.
pub fn matches(status: &JobStatus, filter: &[FilterExpression]) -> bool {
    filter
        .iter()
        .all(|expr| expr.terms.iter().any(|t| term_matches(status, t)))
}

fn term_matches(status: &JobStatus, term: &FilterTerm) -> bool {
    let Some(value) = field_value(status, &term.field) else {
        return false;
    };
    term.op.apply(&value, &term.value) != term.negate
}

fn field_value(status: &JobStatus, field: &str) -> Option<String> {
    let md = &status.metadata;
    let repo = &md.repository;
    let value = match field {
        "name" => status.name.clone(),
        "phase" => status.phase.as_str().to_string(),
        "success" => if status.conditions.success { "1" } else { "0" }.to_string(),
        "owner" => md.owner.clone(),
        "trigger" => md.trigger.as_str().to_string(),
        "created" => OffsetDateTime::from(md.created).format(&Rfc3339).ok()?,
        "repo.owner" => repo.owner.clone(),
        "repo.repo" => repo.repo.clone(),
        "repo.host" => repo.host.clone(),
        "repo.ref" => repo.r#ref.clone(),
        "repo.rev" => repo.revision.clone(),
        other => {
            let key = other.strip_prefix("annotation.")?;
            md.annotation(key)?.to_string()
        }
    };
    Some(value)
}
