//! Generates an error-code-to-name lookup from the `/* Error Codes */`
//! block of an OpenCL-style header.

use std::io::BufRead;
use std::str::FromStr;

use crate::{LabError, LabResult};

const MARKER: &str = "/* Error Codes */";
pub const UNKNOWN_ERROR: &str = "UNKNOWN ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `err_code` switch plus `check_error` and the `checkError` macro.
    C,
    /// A `match`-based `err_code` function.
    Rust,
}

impl FromStr for OutputFormat {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(OutputFormat::C),
            "rust" => Ok(OutputFormat::Rust),
            other => Err(LabError::InvalidParams(format!(
                "unknown output format '{}' (expected c or rust)",
                other
            ))),
        }
    }
}

/// Error names with their codes, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorTable {
    entries: Vec<(String, i32)>,
}

impl ErrorTable {
    /// Reads `#define NAME value` lines after the marker until the first
    /// line that is not a define with a value of zero or below.
    pub fn parse<R: BufRead>(reader: R) -> LabResult<Self> {
        let mut lines = reader.lines();
        let mut found = false;
        for line in lines.by_ref() {
            if line? == MARKER {
                found = true;
                break;
            }
        }
        if !found {
            log::warn!("no '{}' marker found", MARKER);
            return Ok(Self::default());
        }

        let mut entries = Vec::new();
        for line in lines {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let value = match tokens.as_slice() {
                [_, _, value] => value.parse::<i32>().ok(),
                _ => None,
            };
            match value {
                Some(value) if value <= 0 => entries.push((tokens[1].to_string(), value)),
                _ => break,
            }
        }
        log::debug!("parsed {} error codes", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, i32)] {
        &self.entries
    }

    pub fn lookup(&self, code: i32) -> &str {
        self.entries
            .iter()
            .find(|(_, value)| *value == code)
            .map_or(UNKNOWN_ERROR, |(name, _)| name.as_str())
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::C => self.render_c(),
            OutputFormat::Rust => self.render_rust(),
        }
    }

    fn render_c(&self) -> String {
        let mut out = String::from(C_PRELUDE);
        for (name, _) in &self.entries {
            out.push_str(&format!(
                "        case {}:\n            return (char*)\"{}\";\n",
                name, name
            ));
        }
        out.push_str(C_EPILOGUE);
        out
    }

    fn render_rust(&self) -> String {
        let mut out = String::from(
            "/// Name of an OpenCL error code.\npub fn err_code(err: i32) -> &'static str {\n    match err {\n",
        );
        for (name, value) in &self.entries {
            out.push_str(&format!("        {} => \"{}\",\n", value, name));
        }
        out.push_str(&format!("        _ => \"{}\",\n    }}\n}}\n", UNKNOWN_ERROR));
        out
    }
}

const C_PRELUDE: &str = r#"#pragma once
/* err_code(): name of an OpenCL error code. Generated file. */
#if defined(__APPLE__) || defined(__MACOSX)
#include <OpenCL/opencl.h>
#else
#include <CL/cl.h>
#endif

#include <stdio.h>
#include <stdlib.h>

const char *err_code (cl_int err_in)
{
    switch (err_in) {
"#;

const C_EPILOGUE: &str = r#"        default:
            return (char*)"UNKNOWN ERROR";
    }
}

void check_error(cl_int err, const char *operation, char *filename, int line)
{
    if (err != CL_SUCCESS)
    {
        fprintf(stderr, "Error during operation '%s', ", operation);
        fprintf(stderr, "in '%s' on line %d\n", filename, line);
        fprintf(stderr, "Error code was \"%s\" (%d)\n", err_code(err), err);
        exit(EXIT_FAILURE);
    }
}

#define checkError(E, S) check_error(E,S,__FILE__,__LINE__)
"#;

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
#define CL_VERSION_1_0 1

/* Error Codes */
#define CL_SUCCESS                                  0
#define CL_DEVICE_NOT_FOUND                         -1

#define CL_DEVICE_NOT_AVAILABLE                     -2
#define CL_INVALID_VALUE                            -30

/* cl_bool */
#define CL_FALSE 0
";

    #[test]
    fn stops_at_first_non_define() {
        let table = ErrorTable::parse(HEADER.as_bytes()).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup(-1), "CL_DEVICE_NOT_FOUND");
        assert_eq!(table.lookup(-30), "CL_INVALID_VALUE");
        assert_eq!(table.lookup(-9999), UNKNOWN_ERROR);
    }

    #[test]
    fn positive_value_ends_the_block() {
        let header = "/* Error Codes */\n#define CL_A -1\n#define CL_B 4\n#define CL_C -3\n";
        let table = ErrorTable::parse(header.as_bytes()).unwrap();
        assert_eq!(table.entries(), &[("CL_A".to_string(), -1)]);
    }

    #[test]
    fn missing_marker_gives_empty_table() {
        let table = ErrorTable::parse("#define CL_SUCCESS 0\n".as_bytes()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.lookup(0), UNKNOWN_ERROR);
    }

    #[test]
    fn renders_both_languages() {
        let table = ErrorTable::parse(HEADER.as_bytes()).unwrap();

        let c = table.render(OutputFormat::C);
        assert!(c.contains("        case CL_DEVICE_NOT_FOUND:\n            return (char*)\"CL_DEVICE_NOT_FOUND\";"));
        assert!(c.contains("#define checkError(E, S)"));

        let rust = table.render(OutputFormat::Rust);
        assert!(rust.contains("        -2 => \"CL_DEVICE_NOT_AVAILABLE\",\n"));
        assert!(rust.ends_with("        _ => \"UNKNOWN ERROR\",\n    }\n}\n"));
    }

    #[test]
    fn format_names() {
        assert_eq!("rust".parse::<OutputFormat>().unwrap(), OutputFormat::Rust);
        assert!("fortran".parse::<OutputFormat>().is_err());
    }
}
