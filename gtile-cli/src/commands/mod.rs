//! Command implementations for the gtile CLI

pub mod config;
pub mod datasets;
pub mod fragments;
pub mod info;
pub mod tiles;

use crate::error::CliResult;
use serde::Serialize;
use std::io::Write;

/// How results are written to standard output
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub pretty: bool,
}

impl Output {
    pub fn render<T: Serialize>(&self, value: &T) -> CliResult<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }

    pub fn print<T: Serialize>(&self, value: &T) -> CliResult<()> {
        let text = self.render(value)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_modes() {
        let value = json!({ "a": [1, 2] });
        assert_eq!(Output { pretty: false }.render(&value).unwrap(), r#"{"a":[1,2]}"#);
        assert!(Output { pretty: true }.render(&value).unwrap().contains('\n'));
    }
}
