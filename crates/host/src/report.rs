use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};
use std::path::Path;

/// Name of the step recorded for opening a session.
pub const CONNECTION_TEST: &str = "connection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    /// The session could not be established.
    Failed,
    /// A call on an established session did not succeed.
    Error,
    /// Not run because the step it depends on did not succeed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestOutcome {
    fn new(test: impl Into<String>, status: TestStatus) -> Self {
        Self {
            test: test.into(),
            status,
            count: None,
            result: None,
            error: None,
        }
    }

    pub fn success(test: impl Into<String>) -> Self {
        Self::new(test, TestStatus::Success)
    }

    pub fn failed(test: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(test, TestStatus::Failed).with_error(error)
    }

    pub fn error(test: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(test, TestStatus::Error).with_error(error)
    }

    pub fn skipped(test: impl Into<String>) -> Self {
        Self::new(test, TestStatus::Skipped)
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TestStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientReport {
    pub client: String,
    pub transport: String,
    pub tests: Vec<TestOutcome>,
}

impl ClientReport {
    pub fn connected(&self) -> bool {
        self.tests
            .iter()
            .any(|t| t.test == CONNECTION_TEST && t.is_success())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub application: String,
    pub timestamp: DateTime<Utc>,
    pub clients: Vec<ClientReport>,
}

impl Report {
    pub fn new(application: impl Into<String>, clients: Vec<ClientReport>) -> Self {
        Self {
            application: application.into(),
            timestamp: Utc::now(),
            clients,
        }
    }

    pub fn all_connected(&self) -> bool {
        self.clients.iter().all(ClientReport::connected)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }

    /// Human-readable per-client step list.
    pub fn print_summary(&self, out: &mut impl Write) -> io::Result<()> {
        let rule = "=".repeat(60);
        writeln!(out, "{}", rule)?;
        writeln!(out, "TEST RESULTS SUMMARY")?;
        writeln!(out, "{}", rule)?;

        for client in &self.clients {
            writeln!(
                out,
                "\n{} ({})",
                client.client.to_uppercase(),
                client.transport
            )?;
            for test in &client.tests {
                let symbol = match test.status {
                    TestStatus::Success => "✓",
                    TestStatus::Skipped => "-",
                    TestStatus::Failed | TestStatus::Error => "✗",
                };
                writeln!(out, "  {} {}", symbol, title_case(&test.test))?;
                if let Some(count) = test.count {
                    writeln!(out, "    Count: {}", count)?;
                }
                if let (false, Some(error)) = (test.is_success(), &test.error) {
                    writeln!(out, "    Error: {}", error)?;
                }
            }
        }

        writeln!(out, "\n{}", rule)?;
        if self.all_connected() {
            writeln!(out, "ALL CLIENTS CONNECTED SUCCESSFULLY")?;
        } else {
            let failed: Vec<_> = self
                .clients
                .iter()
                .filter(|c| !c.connected())
                .map(|c| c.client.as_str())
                .collect();
            writeln!(out, "SOME CLIENT CONNECTIONS FAILED: {}", failed.join(", "))?;
        }
        writeln!(out, "{}", rule)
    }
}

fn title_case(test: &str) -> String {
    test.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
