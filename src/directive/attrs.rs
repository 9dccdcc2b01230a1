//! Component attribute parsing: `{key=value key="quoted value" flag}`

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ATTR: Regex = Regex::new(
        r#"(?P<key>[^\s"'=<>`/{}]+)(?:\s*=\s*(?:"(?P<double>[^"]*)"|'(?P<single>[^']*)'|(?P<unquoted>[^\s"'=<>`{}]+)))?"#
    )
    .expect("attribute pattern is valid");
}

/// Parse an attribute list. Bare keys map to an empty value; a repeated key
/// keeps its last value.
pub(crate) fn parse_attrs(input: &str) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    for caps in ATTR.captures_iter(input) {
        let value = caps
            .name("double")
            .or_else(|| caps.name("single"))
            .or_else(|| caps.name("unquoted"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        attrs.insert(caps["key"].to_string(), value);
    }
    attrs
}
