//! Path rewriting applied before a request is forwarded upstream.

use crate::config::PathRewrite;
use regex::Regex;

/// Ordered list of compiled `pattern -> replacement` rules.
///
/// Every rule is applied in turn to the output of the previous one; each
/// rule replaces its first match only.
#[derive(Debug, Clone, Default)]
pub struct PathRewriter {
    rules: Vec<(Regex, String)>,
}

impl PathRewriter {
    pub fn new(rules: &[PathRewrite]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| Ok((Regex::new(&rule.pattern)?, rule.replacement.clone())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    pub fn apply(&self, path_and_query: &str) -> String {
        self.rules
            .iter()
            .fold(path_and_query.to_string(), |path, (pattern, replacement)| {
                pattern.replace(&path, replacement.as_str()).into_owned()
            })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
