use crate::JobPhase;
use crate::filter::{FilterError, FilterExpression, FilterOp, FilterTerm};

const OPS: [FilterOp; 4] = [
    FilterOp::Equals,
    FilterOp::Contains,
    FilterOp::StartsWith,
    FilterOp::EndsWith,
];

/// Parse a list of terms such as `owner==alice` or `repo.ref!|=refs/tags`.
pub fn parse<S: AsRef<str>>(exprs: &[S]) -> Result<Vec<FilterTerm>, FilterError> {
    exprs.iter().map(|e| parse_term(e.as_ref())).collect()
}

/// Parse one expression whose alternatives are separated by `,`.
pub fn parse_expression(expr: &str) -> Result<FilterExpression, FilterError> {
    let terms: Vec<&str> = expr.split(',').filter(|t| !t.trim().is_empty()).collect();
    if terms.is_empty() {
        return Err(FilterError::MissingOp);
    }
    Ok(FilterExpression::new(parse(&terms)?))
}

fn parse_term(expr: &str) -> Result<FilterTerm, FilterError> {
    let (op, negate, token) = find_op(expr).ok_or(FilterError::MissingOp)?;
    let Some((field, value)) = expr.split_once(token.as_str()) else {
        return Err(FilterError::MissingOp);
    };

    let field = field.trim();
    let mut value = value.trim().to_string();
    if field.is_empty() {
        return Err(FilterError::MissingField(expr.to_string()));
    }

    match field {
        "success" => value = if value == "true" { "1" } else { "0" }.to_string(),
        "phase" => {
            value
                .parse::<JobPhase>()
                .map_err(FilterError::InvalidPhase)?;
            value = value.to_ascii_lowercase();
        }
        _ => {}
    }

    Ok(FilterTerm {
        field: field.to_string(),
        value,
        op,
        negate,
    })
}

// Negated tokens contain their plain form, so they are looked for first.
fn find_op(expr: &str) -> Option<(FilterOp, bool, String)> {
    for op in OPS {
        let token = format!("!{}", op.token());
        if expr.contains(&token) {
            return Some((op, true, token));
        }
    }
    OPS.into_iter()
        .find(|op| expr.contains(op.token()))
        .map(|op| (op, false, op.token().to_string()))
}
