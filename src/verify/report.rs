// src/verify/report.rs

//! Assertion results and the PASS/FAIL report

use serde::Serialize;
use std::fmt;

/// Outcome of one invariant check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub name: String,
    pub passed: bool,
    /// One entry per violation; empty when the assertion passed
    pub diagnostics: Vec<String>,
}

impl Assertion {
    /// Passed when no diagnostics were produced
    pub fn from_diagnostics(name: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self {
            name: name.into(),
            passed: diagnostics.is_empty(),
            diagnostics,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            return write!(f, "PASS: {}", self.name);
        }
        let mut lines = self.diagnostics.iter();
        match lines.next() {
            Some(first) => write!(f, "FAIL: {}: {}", self.name, first)?,
            None => write!(f, "FAIL: {}", self.name)?,
        }
        for rest in lines {
            write!(f, "\nFAIL: {}: {}", self.name, rest)?;
        }
        Ok(())
    }
}

/// Ordered collection of assertions
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    assertions: Vec<Assertion>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, assertion: Assertion) {
        self.assertions.push(assertion);
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    /// Look up an assertion by name
    pub fn get(&self, name: &str) -> Option<&Assertion> {
        self.assertions.iter().find(|a| a.name == name)
    }

    pub fn passed(&self) -> usize {
        self.assertions.iter().filter(|a| a.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn total(&self) -> usize {
        self.assertions.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// `<passed> passed, <failed> failed, <total> total`
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} total",
            self.passed(),
            self.failed(),
            self.total()
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for assertion in &self.assertions {
            writeln!(f, "{}", assertion)?;
        }
        write!(f, "{}", self.summary())
    }
}
