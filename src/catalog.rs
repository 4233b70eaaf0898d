//! Immutable registry of questionnaire definitions
//!
//! Loaded once at startup; every validation failure here is fatal.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Catalog contains no tests")]
    Empty,
    #[error("Test {0:?} has no questions")]
    NoQuestions(String),
    #[error("Test {0:?} has an empty format tag")]
    EmptyTag(String),
    #[error("Test {0:?} has an empty delimiter")]
    EmptyDelimiter(String),
    #[error("Test {test:?} repeats question {question:?}")]
    DuplicateQuestion { test: String, question: String },
    #[error("Test {0:?} is defined twice")]
    DuplicateTest(String),
    #[error("Test not found: {0}")]
    NotFound(String),
}

/// Output encoding of a completed test
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputFormat {
    pub tag: String,
    #[serde(rename = "del", alias = "delimiter")]
    pub delimiter: String,
}

/// A named, ordered list of questions plus its output encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDefinition {
    pub name: String,
    pub questions: Vec<String>,
    pub format: OutputFormat,
}

impl TestDefinition {
    pub fn new(
        name: impl Into<String>,
        questions: impl IntoIterator<Item = impl Into<String>>,
        tag: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            questions: questions.into_iter().map(Into::into).collect(),
            format: OutputFormat {
                tag: tag.into(),
                delimiter: delimiter.into(),
            },
        }
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.questions.is_empty() {
            return Err(CatalogError::NoQuestions(self.name.clone()));
        }
        if self.format.tag.is_empty() {
            return Err(CatalogError::EmptyTag(self.name.clone()));
        }
        if self.format.delimiter.is_empty() {
            return Err(CatalogError::EmptyDelimiter(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.as_str()) {
                return Err(CatalogError::DuplicateQuestion {
                    test: self.name.clone(),
                    question: question.clone(),
                });
            }
        }
        Ok(())
    }
}

/// On-disk shape of one catalog entry (the name is the object key)
#[derive(Deserialize)]
struct RawTest {
    questions: Vec<String>,
    format: OutputFormat,
}

#[derive(Debug, Clone)]
pub struct TestCatalog {
    tests: Vec<TestDefinition>,
}

impl TestCatalog {
    /// Build a catalog from already-parsed definitions, keeping their order
    pub fn from_definitions(tests: Vec<TestDefinition>) -> Result<Self, CatalogError> {
        if tests.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut names = HashSet::new();
        for test in &tests {
            test.validate()?;
            if !names.insert(test.name.as_str()) {
                return Err(CatalogError::DuplicateTest(test.name.clone()));
            }
        }
        Ok(Self { tests })
    }

    /// Parse the JSON catalog format: `{"<name>": {"questions": [..], "format": {"tag", "del"}}}`
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut tests = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let RawTest { questions, format } = serde_json::from_value(value)?;
            tests.push(TestDefinition {
                name,
                questions,
                format,
            });
        }
        Self::from_definitions(tests)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Skips validation so degenerate tests (e.g. zero questions) can be exercised
    #[cfg(test)]
    pub fn new_unchecked(tests: Vec<TestDefinition>) -> Self {
        Self { tests }
    }

    pub fn lookup(&self, name: &str) -> Result<&TestDefinition, CatalogError> {
        self.tests
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }
}
