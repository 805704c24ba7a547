//! Per-module driver: lowers every routine of a bound module and collects the bodies
//! into a [`ModuleImage`] the evaluator can run.

pub mod lower;

use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::bound::{BoundModule, BoundParam, BoundRoutine};
use crate::config::CodegenOptions;
use crate::diagnostics::CompileError;
use crate::il::RoutineBody;
use crate::runtime::HelperLibrary;
use crate::symbols::SymbolTable;
use crate::types::QualifiedName;

pub use lower::{lower_routine, lower_routine_into};

/// One routine after code generation.
#[derive(Debug, Clone)]
pub struct CompiledRoutine {
    /// `f` for functions, `C::m` for methods.
    pub name: String,
    pub class: Option<QualifiedName>,
    pub is_static: bool,
    pub params: Vec<BoundParam>,
    pub is_generator: bool,
    pub body: RoutineBody,
}

impl CompiledRoutine {
    fn new(routine: BoundRoutine, body: RoutineBody) -> Self {
        CompiledRoutine {
            name: routine.qualified_name(),
            class: routine.class,
            is_static: routine.is_static,
            params: routine.params,
            is_generator: routine.is_generator,
            body,
        }
    }
}

/// Every routine body of a module plus the symbol table they were generated against.
#[derive(Debug, Clone)]
pub struct ModuleImage {
    /// Keyed by lower-cased qualified name; routine names are case-insensitive.
    routines: IndexMap<String, CompiledRoutine>,
    pub symbols: SymbolTable,
    /// [`HelperLibrary::VERSION`] of the catalogue the bodies were resolved against.
    pub helper_version: u32,
}

impl ModuleImage {
    /// Image of already lowered bodies. A later routine replaces an earlier one of the
    /// same name.
    pub fn from_routines(routines: Vec<CompiledRoutine>, symbols: SymbolTable) -> Self {
        let routines = routines.into_iter().map(|r| (r.name.to_ascii_lowercase(), r)).collect();
        ModuleImage { routines, symbols, helper_version: HelperLibrary::VERSION }
    }

    pub fn routine(&self, name: &str) -> Option<&CompiledRoutine> {
        self.routines.get(&name.to_ascii_lowercase())
    }

    pub fn routines(&self) -> impl Iterator<Item = &CompiledRoutine> {
        self.routines.values()
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Dynamic call sites across all bodies.
    pub fn call_sites(&self) -> u32 {
        self.routines.values().map(|r| r.body.call_sites).sum()
    }
}

impl fmt::Display for ModuleImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, routine) in self.routines.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let params: Vec<String> = routine
                .params
                .iter()
                .map(|p| if p.by_ref { format!("&${}", p.name) } else { format!("${}", p.name) })
                .collect();
            write!(f, ".routine {}({})", routine.name, params.join(", "))?;
            if routine.is_static {
                write!(f, " static")?;
            }
            if routine.is_generator {
                write!(f, " generator")?;
            }
            writeln!(f)?;
            write!(f, "{}", routine.body)?;
        }
        Ok(())
    }
}

/// Lowers every routine of `module`.
///
/// Each routine's type context moves with it to the worker that lowers it; routines
/// share only the finalized symbol table and the helper catalogue.
pub fn generate_module(
    module: BoundModule,
    helpers: &HelperLibrary,
    opts: &CodegenOptions,
) -> Result<ModuleImage, CompileError> {
    module.validate()?;
    let BoundModule { routines, symbols } = module;
    let count = routines.len();
    let started = Instant::now();

    let emit = |routine: BoundRoutine| -> Result<CompiledRoutine, CompileError> {
        let body = lower_routine(&routine, &symbols, helpers, opts).map_err(|e| in_routine(&routine, e))?;
        Ok(CompiledRoutine::new(routine, body))
    };
    let compiled: Vec<CompiledRoutine> = if opts.parallel && count > 1 {
        routines.into_par_iter().map(emit).collect::<Result<_, _>>()?
    } else {
        routines.into_iter().map(emit).collect::<Result<_, _>>()?
    };

    let mut image = ModuleImage { routines: IndexMap::with_capacity(count), symbols, helper_version: HelperLibrary::VERSION };
    for routine in compiled {
        let key = routine.name.to_ascii_lowercase();
        if image.routines.contains_key(&key) {
            return Err(CompileError::invariant(format!("routine {} is declared twice", routine.name)));
        }
        debug!(routine = %routine.name, instrs = routine.body.instrs.len(), "routine emitted");
        image.routines.insert(key, routine);
    }
    info!(
        routines = count,
        call_sites = image.call_sites(),
        parallel = opts.parallel,
        elapsed_us = started.elapsed().as_micros() as u64,
        "module generated"
    );
    Ok(image)
}

/// Prefixes errors raised while lowering `routine` with its name.
fn in_routine(routine: &BoundRoutine, err: CompileError) -> CompileError {
    let name = routine.qualified_name();
    match err {
        CompileError::Unsupported { msg, span } => CompileError::Unsupported { msg: format!("{name}: {msg}"), span },
        CompileError::Invariant { msg } => CompileError::Invariant { msg: format!("{name}: {msg}") },
        CompileError::Emit { msg } => CompileError::Emit { msg: format!("{name}: {msg}") },
        other => other,
    }
}
