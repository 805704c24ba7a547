pub mod span;
pub mod diagnostics;
pub mod config;
pub mod types;
pub mod bound;
pub mod symbols;
pub mod il;
pub mod runtime;
pub mod codegen;
pub mod vm;

use std::path::Path;

use bound::BoundModule;
use codegen::ModuleImage;
use config::CodegenOptions;
use diagnostics::CompileError;
use runtime::HelperLibrary;

/// Reads a serialized bound module (JSON) from `path`.
pub fn load_module(path: &Path) -> Result<BoundModule, CompileError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| CompileError::input(format!("cannot read {}: {e}", path.display())))?;
    BoundModule::from_json(&source)
}

/// Generates every routine of `module` against the standard helper catalogue.
pub fn generate(module: BoundModule, opts: &CodegenOptions) -> Result<ModuleImage, CompileError> {
    codegen::generate_module(module, &HelperLibrary::standard(), opts)
}

/// Generates `module` and runs `entry` in the evaluator.
pub fn generate_and_run(module: BoundModule, opts: &CodegenOptions, entry: &str) -> Result<vm::Outcome, CompileError> {
    let helpers = HelperLibrary::standard();
    let image = codegen::generate_module(module, &helpers, opts)?;
    if image.routine(entry).is_none() {
        return Err(CompileError::input(format!("entry routine `{entry}` is not defined")));
    }
    Ok(vm::run(&image, &helpers, entry, Vec::new()))
}
