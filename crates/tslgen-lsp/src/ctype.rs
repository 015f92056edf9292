//! Compact labels for the C types of a definition.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

static FIXED_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(u?)int(\d+)_t$").expect("valid integer type pattern"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid number pattern"));

/// Compare by the first embedded number, then by text. Strings without a
/// number sort after strings with one.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let first_number = |s: &str| {
        NUMBER
            .find(s)
            .and_then(|m| m.as_str().parse::<u64>().ok())
    };
    match (first_number(a), first_number(b)) {
        (None, None) => a.cmp(b),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
    }
}

#[derive(Default)]
struct Buckets<'a> {
    unsigned: Vec<(&'a str, u32)>,
    signed: Vec<(&'a str, u32)>,
    float: Vec<&'a str>,
    double: Vec<&'a str>,
    other: Vec<&'a str>,
}

/// A comma-separated signature for a list of C types.
///
/// `uintN_t`/`intN_t` pairs of the same width collapse into `(u)intN_t` and
/// come first; the remaining types follow grouped as unsigned, signed,
/// float, double and other, each group in natural order.
pub fn type_signature<S: AsRef<str>>(ctypes: &[S]) -> String {
    let mut buckets = Buckets::default();
    for ctype in ctypes {
        let ctype = ctype.as_ref().trim();
        if let Some(captures) = FIXED_WIDTH.captures(ctype) {
            let width = captures[2].parse().unwrap_or(0);
            if captures[1].is_empty() {
                buckets.signed.push((ctype, width));
            } else {
                buckets.unsigned.push((ctype, width));
            }
        } else if ctype.starts_with("float") {
            buckets.float.push(ctype);
        } else if ctype.starts_with("double") {
            buckets.double.push(ctype);
        } else {
            buckets.other.push(ctype);
        }
    }

    let mut collapsed: Vec<u32> = buckets
        .unsigned
        .iter()
        .map(|(_, width)| *width)
        .filter(|width| buckets.signed.iter().any(|(_, w)| w == width))
        .collect();
    collapsed.sort_unstable();
    collapsed.dedup();

    let mut labels: Vec<String> = collapsed
        .iter()
        .map(|width| format!("(u)int{width}_t"))
        .collect();
    for mut group in [
        without_widths(&buckets.unsigned, &collapsed),
        without_widths(&buckets.signed, &collapsed),
        buckets.float,
        buckets.double,
        buckets.other,
    ] {
        group.sort_by(|a, b| natural_cmp(a, b));
        group.dedup();
        labels.extend(group.into_iter().map(str::to_string));
    }
    labels.join(", ")
}

fn without_widths<'a>(types: &[(&'a str, u32)], widths: &[u32]) -> Vec<&'a str> {
    types
        .iter()
        .filter(|(_, width)| !widths.contains(width))
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_order() {
        let mut types = vec!["uint64_t", "uint8_t", "uint16_t", "bool", "uint32_t"];
        types.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(types, vec!["uint8_t", "uint16_t", "uint32_t", "uint64_t", "bool"]);
    }

    #[test]
    fn test_pairs_collapse() {
        assert_eq!(type_signature(&["int32_t", "uint32_t"]), "(u)int32_t");
        assert_eq!(
            type_signature(&["uint8_t", "int64_t", "double", "uint64_t", "int8_t", "float", "uint16_t"]),
            "(u)int8_t, (u)int64_t, uint16_t, float, double"
        );
    }

    #[test]
    fn test_unpaired_and_other_types() {
        assert_eq!(
            type_signature(&["int16_t", "uint32_t", "bool", "int8_t"]),
            "uint32_t, int8_t, int16_t, bool"
        );
        assert_eq!(type_signature::<&str>(&[]), "");
    }
}
