use crate::error::{DelimitedError, DelimitedResult};

/// Parses `true` or `false`, ignoring ASCII case.
pub fn parse_bool(s: &str) -> DelimitedResult<bool> {
    s.to_ascii_lowercase()
        .parse::<bool>()
        .map_err(|err| DelimitedError::from(err).with_detail(format!("received: '{s}'")))
}
