#![allow(dead_code)]

use std::process::Command;

use phlow::bound::builder::{ModuleBuilder, RoutineBuilder};
use phlow::codegen::{generate_module, ModuleImage};
use phlow::config::CodegenOptions;
use phlow::diagnostics::CompileError;
use phlow::runtime::{Fault, HelperLibrary, PhpValue};
use phlow::symbols::ClassSymbol;
use phlow::vm::{self, Outcome};

pub fn phlowc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_phlowc"))
}

/// A module assembled from hand-built routines, generated and run in one go.
pub struct TestProgram {
    module: ModuleBuilder,
    opts: CodegenOptions,
}

impl TestProgram {
    pub fn new() -> Self {
        TestProgram { module: ModuleBuilder::new(), opts: CodegenOptions::default() }
    }

    pub fn options(mut self, opts: CodegenOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn class(mut self, class: ClassSymbol) -> Self {
        self.module.class(class);
        self
    }

    pub fn routine(mut self, rb: RoutineBuilder) -> Self {
        self.module.routine(rb.build());
        self
    }

    /// Adds `main`, built by `body` from its first block.
    pub fn main(self, body: impl FnOnce(&mut RoutineBuilder, usize)) -> Self {
        let mut rb = RoutineBuilder::function("main");
        let b = rb.block();
        body(&mut rb, b);
        self.routine(rb)
    }

    pub fn try_emit(self) -> Result<ModuleImage, CompileError> {
        generate_module(self.module.finish(), &HelperLibrary::standard(), &self.opts)
    }

    pub fn emit(self) -> ModuleImage {
        match self.try_emit() {
            Ok(image) => image,
            Err(err) => panic!("code generation failed: {err}"),
        }
    }

    pub fn emit_err(self) -> CompileError {
        match self.try_emit() {
            Ok(image) => panic!("code generation should have failed:\n{image}"),
            Err(err) => err,
        }
    }

    pub fn run_with(self, entry: &str, args: Vec<PhpValue>) -> Outcome {
        let helpers = HelperLibrary::standard();
        let image = match generate_module(self.module.finish(), &helpers, &self.opts) {
            Ok(image) => image,
            Err(err) => panic!("code generation failed: {err}"),
        };
        vm::run(&image, &helpers, entry, args)
    }

    pub fn run(self) -> Outcome {
        self.run_with("main", Vec::new())
    }

    /// Echoed output of `main`, which must complete normally.
    pub fn output(self) -> String {
        let outcome = self.run();
        if let Err(fault) = &outcome.result {
            panic!("main failed: {fault}\noutput so far: {:?}", outcome.output);
        }
        outcome.output
    }
}

/// Class of the exception `outcome` ended with.
pub fn uncaught_class(outcome: &Outcome) -> String {
    match &outcome.result {
        Err(Fault::Thrown(ex)) => ex.class().to_string(),
        other => panic!("expected an uncaught exception, got {other:?}"),
    }
}

pub fn uncaught_message(outcome: &Outcome) -> String {
    match &outcome.result {
        Err(Fault::Thrown(ex)) => ex.message(),
        other => panic!("expected an uncaught exception, got {other:?}"),
    }
}
