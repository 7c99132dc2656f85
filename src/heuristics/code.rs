// src/heuristics/code.rs

/// Product family whose second hyphen segment is part of the reportable code.
const VARIANT_FAMILY_PREFIX: &str = "2100";

/// Canonicalize a raw invoice product code into a master-data key.
///
/// `210013-010-M210013010` keeps its variant segment (`210013-010`); every
/// other hyphenated code is cut at the first hyphen (`40858-M40858` -> `40858`).
pub fn normalize(raw: &str) -> String {
    let code = raw.trim();
    if !code.contains('-') {
        return code.to_string();
    }

    if code.starts_with(VARIANT_FAMILY_PREFIX) {
        let mut segments = code.split('-');
        return match (segments.next(), segments.next()) {
            (Some(family), Some(variant)) => format!("{family}-{variant}"),
            _ => code.to_string(),
        };
    }

    code.split('-').next().unwrap_or(code).to_string()
}
