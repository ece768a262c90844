// Output formatting for CLI

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::cli::config::OutputFormat;

/// Format and output data
pub struct OutputFormatter {
    format: OutputFormat,
    pub quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    /// Output any serializable record
    pub fn output<T: Serialize>(&self, record: &T, writer: &mut impl Write) -> Result<()> {
        let value = serde_json::to_value(record)?;
        match self.format {
            OutputFormat::Pretty => writeln!(writer, "{}", serde_json::to_string_pretty(&value)?)?,
            OutputFormat::Json => writeln!(writer, "{}", serde_json::to_string(&value)?)?,
            OutputFormat::KeyValue => self.output_key_value(&value, "", writer)?,
        }
        Ok(())
    }

    /// Flatten nested objects into dotted keys
    fn output_key_value(
        &self,
        value: &serde_json::Value,
        prefix: &str,
        writer: &mut impl Write,
    ) -> Result<()> {
        match value {
            serde_json::Value::Object(obj) => {
                for (key, value) in obj {
                    let key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    self.output_key_value(value, &key, writer)?;
                }
            }
            serde_json::Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.output_key_value(item, &format!("{}[{}]", prefix, index), writer)?;
                }
            }
            other => writeln!(writer, "{}: {}", prefix, format_value(other))?,
        }
        Ok(())
    }

    /// Print success message
    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            println!("✓ {}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if !self.quiet {
            println!("  {}", message);
        }
    }
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "(none)".to_string(),
        other => other.to_string(),
    }
}
