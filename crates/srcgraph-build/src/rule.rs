//! Build rules: a target file, the files it is made from and how

use std::fmt;

/// One make-style rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRule {
    pub target: String,
    pub prereqs: Vec<String>,
    /// Shell lines run in order to produce `target`.
    pub recipe: Vec<String>,
}

impl BuildRule {
    pub fn new(target: impl Into<String>) -> Self {
        BuildRule {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn prereq(mut self, prereq: impl Into<String>) -> Self {
        self.prereqs.push(prereq.into());
        self
    }

    pub fn prereqs<I, S>(mut self, prereqs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prereqs.extend(prereqs.into_iter().map(Into::into));
        self
    }

    pub fn recipe(mut self, line: impl Into<String>) -> Self {
        self.recipe.push(line.into());
        self
    }

    /// Special make targets such as `.DELETE_ON_ERROR` build nothing.
    pub fn is_special(&self) -> bool {
        self.target.starts_with('.') && self.target[1..].chars().all(|c| c.is_ascii_uppercase() || c == '_')
    }
}

impl fmt::Display for BuildRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.target)?;
        for prereq in &self.prereqs {
            write!(f, " {prereq}")?;
        }
        writeln!(f)?;
        for line in &self.recipe {
            writeln!(f, "\t{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_rendering() {
        let rule = BuildRule::new("out/units.json")
            .prereq("package.json")
            .recipe("mkdir -p $(@D)")
            .recipe("srcgraph scan --json 1> $@");
        assert_eq!(
            rule.to_string(),
            "out/units.json: package.json\n\tmkdir -p $(@D)\n\tsrcgraph scan --json 1> $@\n"
        );
        assert_eq!(BuildRule::new("all").to_string(), "all:\n");
    }

    #[test]
    fn test_special_targets() {
        assert!(BuildRule::new(".DELETE_ON_ERROR").is_special());
        assert!(!BuildRule::new(".srcgraph/units.json").is_special());
        assert!(!BuildRule::new("all").is_special());
    }
}
