//! Text templates with `@@NAME@@` placeholders.
//!
//! The TikZ sources use braces everywhere, so placeholders are delimited by
//! `@@` instead.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::error::{FigureError, FigureResult};

const DELIMITER: &str = "@@";

pub const NUMERICAL_FIGURE_FILE: &str = "numerical_figure.txt";
pub const ARITHMETIC_FIGURE_FILE: &str = "arithmetic_figure.txt";
pub const UNIT_FILE: &str = "unit.txt";

/// A template whose placeholders are filled by [`Template::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Template {
            source: source.into(),
        }
    }

    pub fn from_file(path: &Path) -> FigureResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            FigureError::template(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Ok(Template::new(source))
    }

    /// Names of every placeholder, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find(DELIMITER) {
            let after = &rest[start + DELIMITER.len()..];
            let Some(end) = after.find(DELIMITER) else {
                break;
            };
            let name = &after[..end];
            if !names.contains(&name) {
                names.push(name);
            }
            rest = &after[end + DELIMITER.len()..];
        }
        names
    }

    /// Substitutes every placeholder. A placeholder without a value, or an
    /// unterminated one, is an error.
    pub fn render<K, V>(&self, values: &BTreeMap<K, V>) -> FigureResult<String>
    where
        K: std::borrow::Borrow<str> + Ord,
        V: AsRef<str>,
    {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find(DELIMITER) {
            out.push_str(&rest[..start]);
            let after = &rest[start + DELIMITER.len()..];
            let end = after.find(DELIMITER).ok_or_else(|| {
                FigureError::template(format!(
                    "unterminated placeholder near '{}'",
                    after.lines().next().unwrap_or_default()
                ))
            })?;
            let name = &after[..end];
            let value = values
                .get(name)
                .ok_or_else(|| FigureError::template(format!("no value for {0}{1}{0}", DELIMITER, name)))?;
            out.push_str(value.as_ref());
            rest = &after[end + DELIMITER.len()..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// The three templates a figure is assembled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub numerical_figure: Template,
    pub arithmetic_figure: Template,
    /// One input unit of an arithmetic figure.
    pub unit: Template,
}

impl Default for Templates {
    fn default() -> Self {
        Templates::embedded()
    }
}

impl Templates {
    /// Templates compiled into the binary.
    pub fn embedded() -> Self {
        Templates {
            numerical_figure: Template::new(include_str!("../templates/numerical_figure.txt")),
            arithmetic_figure: Template::new(include_str!("../templates/arithmetic_figure.txt")),
            unit: Template::new(include_str!("../templates/unit.txt")),
        }
    }

    /// Reads `numerical_figure.txt`, `arithmetic_figure.txt` and `unit.txt` from `dir`.
    pub fn load(dir: &Path) -> FigureResult<Self> {
        let path = |file: &str| -> PathBuf { dir.join(file) };
        Ok(Templates {
            numerical_figure: Template::from_file(&path(NUMERICAL_FIGURE_FILE))?,
            arithmetic_figure: Template::from_file(&path(ARITHMETIC_FIGURE_FILE))?,
            unit: Template::from_file(&path(UNIT_FILE))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_every_occurrence() {
        let t = Template::new("\\draw (0,0) grid (@@TO@@); % @@TO@@ @@NAME@@");
        let values = BTreeMap::from([("TO", "3,3"), ("NAME", "x")]);
        assert_eq!(
            t.render(&values).unwrap(),
            "\\draw (0,0) grid (3,3); % 3,3 x"
        );
    }

    #[test]
    fn missing_value_is_an_error() {
        let t = Template::new("(@@FROM@@) rectangle (@@TO@@)");
        let values = BTreeMap::from([("FROM", "0,0")]);
        let err = t.render(&values).unwrap_err();
        assert!(matches!(err, FigureError::Template(ref msg) if msg.contains("@@TO@@")));
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        let t = Template::new("(@@FROM) rectangle");
        let values: BTreeMap<&str, &str> = BTreeMap::new();
        assert!(matches!(t.render(&values), Err(FigureError::Template(_))));
    }

    #[test]
    fn placeholders_are_listed_once() {
        let t = Template::new("@@A@@ @@B@@ @@A@@");
        assert_eq!(t.placeholders(), vec!["A", "B"]);
    }

    #[test]
    fn embedded_templates_declare_their_placeholders() {
        let t = Templates::embedded();
        let numerical = t.numerical_figure.placeholders();
        for name in ["PADDING_TO", "INPUT_VALUES", "KERNEL_VALUES", "OUTPUT_VALUES"] {
            assert!(numerical.contains(&name), "{name} missing");
        }
        let arithmetic = t.arithmetic_figure.placeholders();
        for name in ["INPUT_UNITS", "OUTPUT_TOP_RIGHT", "OUTPUT_ELEVATION"] {
            assert!(arithmetic.contains(&name), "{name} missing");
        }
        assert_eq!(t.unit.placeholders(), vec!["FROM", "TO"]);
    }

    #[test]
    fn embedded_placeholders_are_never_inside_comments() {
        let t = Templates::embedded();
        for template in [&t.numerical_figure, &t.arithmetic_figure, &t.unit] {
            for line in template.source.lines() {
                if let Some((_, comment)) = line.split_once('%') {
                    assert!(!comment.contains("@@"), "placeholder in comment: {line}");
                }
            }
        }
    }

    #[test]
    fn load_reports_missing_directory() {
        let err = Templates::load(Path::new("target/no-such-template-dir")).unwrap_err();
        assert!(matches!(err, FigureError::Template(_)));
    }
}
