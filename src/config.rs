use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostics::CompileError;

pub const CONFIG_FILE: &str = "phlow.toml";

/// Knobs of the code generator, read from the `[codegen]` table of `phlow.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodegenOptions {
    /// Attach source spans to statements.
    pub emit_sequence_points: bool,
    /// Test loop conditions at the bottom and branch back into the body on true.
    pub invert_loop_conditions: bool,
    /// Lower switches over integer constants to a jump table.
    pub integer_switch_tables: bool,
    /// Widest `max - min + 1` case range lowered to a jump table.
    pub max_switch_table_span: u32,
    /// Emit independent routines on the rayon pool.
    pub parallel: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            emit_sequence_points: true,
            invert_loop_conditions: true,
            integer_switch_tables: true,
            max_switch_table_span: 256,
            parallel: true,
        }
    }
}

// ---- TOML deserialization types ----

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    codegen: CodegenOptions,
}

impl CodegenOptions {
    pub fn parse(source: &str, path: &Path) -> Result<Self, CompileError> {
        let config: TomlConfig = toml::from_str(source)
            .map_err(|e| CompileError::config(format!("{CONFIG_FILE}: {}", e.message()), path.to_path_buf()))?;
        if config.codegen.max_switch_table_span == 0 {
            return Err(CompileError::config(
                "codegen.max_switch_table_span must be at least 1",
                path.to_path_buf(),
            ));
        }
        Ok(config.codegen)
    }

    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompileError::config(format!("cannot read {CONFIG_FILE}: {e}"), path.to_path_buf()))?;
        Self::parse(&source, path)
    }

    /// Finds `phlow.toml` in `start_dir` or an ancestor and loads it; defaults when there
    /// is none.
    pub fn discover(start_dir: &Path) -> Result<Self, CompileError> {
        match find_config_walk(start_dir) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Walks up from `start_dir`, stopping at a repository root.
fn find_config_walk(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir.join(".git").exists() {
            return None;
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let opts = CodegenOptions::parse("", Path::new("phlow.toml")).unwrap();
        assert_eq!(opts, CodegenOptions::default());
    }

    #[test]
    fn test_partial_table() {
        let opts = CodegenOptions::parse("[codegen]\nparallel = false\n", Path::new("phlow.toml")).unwrap();
        assert!(!opts.parallel);
        assert!(opts.integer_switch_tables);
    }

    #[test]
    fn test_zero_span_rejected() {
        let err = CodegenOptions::parse("[codegen]\nmax_switch_table_span = 0\n", Path::new("p.toml")).unwrap_err();
        assert!(matches!(err, CompileError::Config { .. }));
    }
}
