//! Reference evaluator for generated bodies.
//!
//! [`Machine`] interprets a [`ModuleImage`] instruction by instruction and is the
//! [`RuntimeHost`] the helpers call back into: it owns the program's output, resolves
//! functions, methods and classes against the image, and drives generator bodies.

mod exec;
mod frame;
mod native;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::bound::ConstValue;
use crate::codegen::{CompiledRoutine, ModuleImage};
use crate::il::CatchFilter;
use crate::runtime::generator::{self, GeneratorFrame, FINISHED};
use crate::runtime::{
    convert, CallSiteFlags, CallSiteKind, CallSiteShape, Delegate, Fault, GeneratorState, HelperLibrary, ObjectRef,
    PhpAlias, PhpException, PhpObject, PhpValue, RuntimeHost, Slot,
};
use crate::types::QualifiedName;

use frame::{fresh_locals, Frame};

/// Nesting depth at which calls fail instead of exhausting the native stack.
pub const MAX_CALL_DEPTH: usize = 256;

/// Result of running an entry routine to completion.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<PhpValue, Fault>,
    pub output: String,
    pub warnings: Vec<String>,
    /// Call-site delegates constructed during the run.
    pub binds: usize,
    /// Enumerators released by `foreach` loops during the run.
    pub disposals: usize,
}

impl Outcome {
    /// Process exit status: the `exit` code, 255 for an uncaught fault, 0 otherwise.
    pub fn exit_status(&self) -> i32 {
        match &self.result {
            Ok(_) => 0,
            Err(Fault::Exit(code)) => *code as i32,
            Err(_) => 255,
        }
    }
}

/// Runs `entry` of `image` with `args` on a fresh machine.
pub fn run(image: &ModuleImage, helpers: &HelperLibrary, entry: &str, args: Vec<PhpValue>) -> Outcome {
    let mut machine = Machine::new(image, helpers);
    let result = machine.call(entry, args);
    machine.finish(result)
}

pub struct Machine<'m> {
    image: &'m ModuleImage,
    helpers: &'m HelperLibrary,
    output: String,
    warnings: Vec<String>,
    binds: usize,
    disposals: usize,
    /// Call-site delegate slots of each routine, by routine name.
    sites: HashMap<String, Vec<Slot>>,
    /// `$this` of every active frame, innermost last.
    scopes: Vec<Option<ObjectRef>>,
    depth: usize,
}

impl<'m> Machine<'m> {
    pub fn new(image: &'m ModuleImage, helpers: &'m HelperLibrary) -> Self {
        if image.helper_version != HelperLibrary::VERSION {
            debug!(image = image.helper_version, runtime = HelperLibrary::VERSION, "helper catalogue version differs");
        }
        Machine {
            image,
            helpers,
            output: String::new(),
            warnings: Vec::new(),
            binds: 0,
            disposals: 0,
            sites: HashMap::new(),
            scopes: Vec::new(),
            depth: 0,
        }
    }

    /// Calls function `name`, or `C::m` for a static method.
    pub fn call(&mut self, name: &str, args: Vec<PhpValue>) -> Result<PhpValue, Fault> {
        let args = args.into_iter().map(slot_of).collect();
        match name.split_once("::") {
            Some((class, method)) => self.call_static(&QualifiedName::new(class), method, args),
            None => self.call_function(name, args),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn generator_current(&mut self, generator: &ObjectRef) -> Result<PhpValue, Fault> {
        generator::current(self, generator)
    }

    pub fn generator_key(&mut self, generator: &ObjectRef) -> Result<PhpValue, Fault> {
        generator::key(self, generator)
    }

    pub fn generator_next(&mut self, generator: &ObjectRef) -> Result<(), Fault> {
        generator::next(self, generator)
    }

    pub fn generator_valid(&mut self, generator: &ObjectRef) -> Result<bool, Fault> {
        generator::valid(self, generator)
    }

    pub fn generator_send(&mut self, generator: &ObjectRef, value: PhpValue) -> Result<PhpValue, Fault> {
        generator::send(self, generator, value)
    }

    pub fn generator_throw(&mut self, generator: &ObjectRef, exception: PhpException) -> Result<PhpValue, Fault> {
        generator::throw(self, generator, exception)
    }

    pub fn generator_get_return(&self, generator: &ObjectRef) -> Result<PhpValue, Fault> {
        generator::get_return(generator)
    }

    pub fn finish(self, result: Result<PhpValue, Fault>) -> Outcome {
        Outcome {
            result,
            output: self.output,
            warnings: self.warnings,
            binds: self.binds,
            disposals: self.disposals,
        }
    }

    fn filter_matches(&self, filter: &CatchFilter, fault: &Fault) -> bool {
        match (filter, fault) {
            (CatchFilter::ScriptDied, Fault::Exit(_)) => true,
            (CatchFilter::Any, Fault::Thrown(_)) => true,
            (CatchFilter::Classes(classes), Fault::Thrown(ex)) => {
                classes.iter().any(|c| self.image.symbols.is_subclass_of(ex.class(), c))
            }
            _ => false,
        }
    }

    fn call_function(&mut self, name: &str, args: Vec<Slot>) -> Result<PhpValue, Fault> {
        match self.image.routine(name).filter(|r| r.class.is_none()) {
            Some(routine) => self.call_compiled(routine, args, None),
            None => Err(Fault::error(format!("Call to undefined function {name}()"))),
        }
    }

    fn call_compiled(&mut self, routine: &'m CompiledRoutine, args: Vec<Slot>, this: Option<ObjectRef>) -> Result<PhpValue, Fault> {
        let args = bind_args(routine, args)?;
        if routine.is_generator {
            let frame = GeneratorFrame { routine: routine.name.clone(), args, locals: Vec::new(), this };
            return Ok(PhpValue::Object(PhpObject::new_generator(GeneratorState::new(frame))));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Fault::error(format!("Maximum call depth of {MAX_CALL_DEPTH} reached in {}()", routine.name)));
        }
        self.depth += 1;
        let mut frame = Frame::new(routine, args, this);
        let result = self.run_frame(&mut frame);
        self.depth -= 1;
        Ok(returned(result?)?)
    }

    fn call_method(&mut self, this: ObjectRef, name: &str, args: Vec<Slot>) -> Result<PhpValue, Fault> {
        if this.is_generator() {
            return self.generator_method(&this, name, args);
        }
        let image = self.image;
        if let Some(routine) = image.symbols.find_method(&this.class, name).and_then(|(decl, m)| method_routine(image, decl.name.as_str(), &m.name)) {
            let this = (!routine.is_static).then_some(this);
            return self.call_compiled(routine, args, this);
        }
        if image.symbols.is_subclass_of(&this.class, &QualifiedName::new("Throwable")) {
            match name.to_ascii_lowercase().as_str() {
                "getmessage" => return Ok(this.get("message").unwrap_or_default()),
                "getcode" => return Ok(this.get("code").unwrap_or(PhpValue::Long(0))),
                _ => {}
            }
        }
        Err(Fault::error(format!("Call to undefined method {}::{name}()", this.class)))
    }

    fn call_static(&mut self, class: &QualifiedName, name: &str, args: Vec<Slot>) -> Result<PhpValue, Fault> {
        let image = self.image;
        if image.symbols.class(class).is_none() {
            return Err(Fault::error(format!("Class \"{class}\" not found")));
        }
        let routine = image
            .symbols
            .find_method(class, name)
            .and_then(|(decl, m)| method_routine(image, decl.name.as_str(), &m.name))
            .ok_or_else(|| Fault::error(format!("Call to undefined method {class}::{name}()")))?;
        // `parent::m()` and `self::m()` keep the caller's instance.
        let this = match self.scopes.last() {
            Some(Some(this)) if !routine.is_static && image.symbols.is_subclass_of(&this.class, class) => Some(this.clone()),
            _ => None,
        };
        if !routine.is_static && this.is_none() {
            return Err(Fault::error(format!("Non-static method {class}::{name}() cannot be called statically")));
        }
        self.call_compiled(routine, args, this)
    }

    fn instantiate(&mut self, class: &QualifiedName, args: Vec<Slot>) -> Result<ObjectRef, Fault> {
        let image = self.image;
        let sym = image
            .symbols
            .class(class)
            .ok_or_else(|| Fault::error(format!("Class \"{class}\" not found")))?;
        if sym.is_interface {
            return Err(Fault::error(format!("Cannot instantiate interface {}", sym.name)));
        }
        let obj = PhpObject::new(sym.name.clone());
        for field in image.symbols.fields_of(class) {
            obj.set(&field.name, field.default.as_ref().map(const_value).unwrap_or_default());
        }
        let ctor = image
            .symbols
            .find_method(class, "__construct")
            .and_then(|(decl, m)| method_routine(image, decl.name.as_str(), &m.name));
        if let Some(ctor) = ctor {
            self.call_compiled(ctor, args, Some(obj.clone()))?;
        } else if image.symbols.is_subclass_of(class, &QualifiedName::new("Throwable")) {
            let mut args = args.into_iter();
            let message = match args.next() {
                Some(slot) => convert::to_string(self, &slot.into_value()?)?,
                None => String::new(),
            };
            let code = args.next().map(|s| s.into_value().map(|v| convert::to_long(&v))).transpose()?.unwrap_or(0);
            obj.set("message", PhpValue::String(message));
            obj.set("code", PhpValue::Long(code));
        }
        Ok(obj)
    }

    fn invoke_delegate(&mut self, delegate: &Delegate, operands: Vec<Slot>) -> Result<PhpValue, Fault> {
        let shape = delegate.shape();
        let mut operands = operands.into_iter();
        let mut take = |flag: CallSiteFlags| -> Result<Option<Slot>, Fault> {
            if !shape.flags.contains(flag) {
                return Ok(None);
            }
            operands.next().map(Some).ok_or_else(|| Fault::internal("delegate invoked without its leading operands"))
        };
        let instance = take(CallSiteFlags::HAS_INSTANCE)?;
        let class = take(CallSiteFlags::HAS_TYPE_HANDLE)?.map(Slot::into_type_handle).transpose()?;
        let name_expr = take(CallSiteFlags::HAS_NAME_EXPR)?;
        let args: Vec<Slot> = operands.collect();
        if args.len() != usize::from(shape.argc) {
            return Err(Fault::internal(format!("delegate for {} argument(s) invoked with {}", shape.argc, args.len())));
        }
        let name = match (&shape.name, name_expr) {
            (Some(name), _) => name.clone(),
            (None, Some(slot)) => convert::to_string(self, &slot.into_value()?)?,
            (None, None) => return Err(Fault::internal("delegate has no callee name")),
        };
        trace!(kind = ?shape.kind, %name, argc = shape.argc, "dynamic call");
        match shape.kind {
            CallSiteKind::Function => self.call_function(&name, args),
            CallSiteKind::InstanceMethod => {
                let receiver = instance.map(Slot::into_value).transpose()?.unwrap_or_default().dereferenced();
                match receiver {
                    PhpValue::Object(obj) => self.call_method(obj, &name, args),
                    other => Err(Fault::error(format!("Call to a member function {name}() on {}", other.type_name()))),
                }
            }
            CallSiteKind::StaticMethod => {
                let class = class.ok_or_else(|| Fault::internal("static call site without a class operand"))?;
                self.call_static(&class, &name, args)
            }
        }
    }

    fn generator_method(&mut self, generator: &ObjectRef, name: &str, args: Vec<Slot>) -> Result<PhpValue, Fault> {
        let mut args = args.into_iter().map(|s| s.into_value().map(PhpValue::dereferenced));
        let mut arg = || args.next().transpose().map(Option::unwrap_or_default);
        match name.to_ascii_lowercase().as_str() {
            "current" => generator::current(self, generator),
            "key" => generator::key(self, generator),
            "next" => generator::next(self, generator).map(|()| PhpValue::Null),
            "valid" => generator::valid(self, generator).map(PhpValue::Bool),
            "rewind" => generator::rewind(self, generator).map(|()| PhpValue::Null),
            "send" => {
                let value = arg()?;
                generator::send(self, generator, value)
            }
            "throw" => match arg()? {
                PhpValue::Object(ex) if self.image.symbols.is_subclass_of(&ex.class, &QualifiedName::new("Throwable")) => {
                    generator::throw(self, generator, PhpException(ex))
                }
                other => Err(Fault::type_error(format!(
                    "Generator::throw(): Argument #1 ($exception) must be of type Throwable, {} given",
                    other.type_name()
                ))),
            },
            "getreturn" => generator::get_return(generator),
            _ => Err(Fault::error(format!("Call to undefined method Generator::{name}()"))),
        }
    }

    fn site_slots(&mut self, routine: &CompiledRoutine) -> &mut Vec<Slot> {
        self.sites
            .entry(routine.name.clone())
            .or_insert_with(|| vec![Slot::Null; routine.body.call_sites as usize])
    }
}

impl RuntimeHost for Machine<'_> {
    fn echo(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn warn(&mut self, message: &str) {
        debug!(%message, "program warning");
        self.warnings.push(message.to_string());
    }

    fn invoke_function(&mut self, name: &str, args: Vec<PhpValue>) -> Result<PhpValue, Fault> {
        self.call_function(name, args.into_iter().map(slot_of).collect())
    }

    fn invoke_method(&mut self, this: ObjectRef, name: &str, args: Vec<PhpValue>) -> Result<PhpValue, Fault> {
        self.call_method(this, name, args.into_iter().map(slot_of).collect())
    }

    fn invoke_static(&mut self, class: &QualifiedName, name: &str, args: Vec<PhpValue>) -> Result<PhpValue, Fault> {
        self.call_static(class, name, args.into_iter().map(slot_of).collect())
    }

    fn new_object(&mut self, class: &QualifiedName, args: Vec<PhpValue>) -> Result<ObjectRef, Fault> {
        self.instantiate(class, args.into_iter().map(slot_of).collect())
    }

    fn resume_generator(&mut self, generator: &ObjectRef) -> Result<(), Fault> {
        let saved = generator::state_of(generator)?
            .frame
            .take()
            .ok_or_else(|| Fault::internal("generator resumed without a saved frame"))?;
        let image = self.image;
        let routine = image
            .routine(&saved.routine)
            .ok_or_else(|| Fault::internal(format!("generator body {} is not in the image", saved.routine)))?;
        let locals = if saved.locals.len() == routine.body.locals.len() { saved.locals } else { fresh_locals(&routine.body) };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Fault::error(format!("Maximum call depth of {MAX_CALL_DEPTH} reached in {}()", routine.name)));
        }
        self.depth += 1;
        let mut frame = Frame::resume(routine, saved.args, locals, saved.this, Some(generator.clone()));
        let result = self.run_frame(&mut frame);
        self.depth -= 1;

        let mut st = generator::state_of(generator)?;
        match result {
            Ok(_) if st.state > 0 => {
                st.frame = Some(GeneratorFrame {
                    routine: saved.routine,
                    args: frame.args,
                    locals: frame.locals,
                    this: frame.this,
                });
                Ok(())
            }
            Ok(_) => {
                if st.state != FINISHED {
                    trace!(state = st.state, "generator body returned without finishing");
                }
                st.finish();
                Ok(())
            }
            Err(fault) => {
                st.finish();
                Err(fault)
            }
        }
    }

    fn is_subclass_of(&self, class: &QualifiedName, parent: &QualifiedName) -> bool {
        self.image.symbols.is_subclass_of(class, parent)
    }

    fn has_method(&self, class: &QualifiedName, name: &str) -> bool {
        if class.matches("Generator") {
            return matches!(
                name.to_ascii_lowercase().as_str(),
                "current" | "key" | "next" | "valid" | "rewind" | "send" | "throw" | "getreturn"
            );
        }
        self.image.symbols.find_method(class, name).is_some()
    }

    fn note_call_site_bind(&mut self, shape: &CallSiteShape) {
        trace!(kind = ?shape.kind, name = shape.name.as_deref().unwrap_or("<dynamic>"), "call site bound");
        self.binds += 1;
    }

    fn note_enumerator_disposed(&mut self) {
        trace!("enumerator disposed");
        self.disposals += 1;
    }
}

fn method_routine<'m>(image: &'m ModuleImage, class: &str, method: &str) -> Option<&'m CompiledRoutine> {
    image.routine(&format!("{class}::{method}"))
}

/// Argument slot of a host-level value: references stay references.
fn slot_of(value: PhpValue) -> Slot {
    match value {
        PhpValue::Alias(alias) => Slot::Alias(alias),
        other => Slot::Value(other),
    }
}

fn returned(slot: Slot) -> Result<PhpValue, Fault> {
    match slot {
        Slot::Void => Ok(PhpValue::Null),
        other => Ok(other.into_value()?.dereferenced()),
    }
}

pub(crate) fn const_value(c: &ConstValue) -> PhpValue {
    match c {
        ConstValue::Null => PhpValue::Null,
        ConstValue::Bool(b) => PhpValue::Bool(*b),
        ConstValue::Long(l) => PhpValue::Long(*l),
        ConstValue::Double(d) => PhpValue::Double(*d),
        ConstValue::String(s) => PhpValue::String(s.clone()),
    }
}

/// Matches passed arguments to parameters: aliases for by-reference parameters,
/// dereferenced values otherwise, defaults for the missing tail.
fn bind_args(routine: &CompiledRoutine, args: Vec<Slot>) -> Result<Vec<Slot>, Fault> {
    let passed = args.len();
    let mut args = args.into_iter();
    let mut bound = Vec::with_capacity(routine.params.len());
    for param in &routine.params {
        let slot = match args.next() {
            Some(slot) => slot,
            None => match &param.default {
                Some(default) => Slot::Value(const_value(default)),
                None => {
                    let required = routine.params.iter().filter(|p| p.default.is_none()).count();
                    return Err(Fault::throw(
                        "ArgumentCountError",
                        format!(
                            "Too few arguments to function {}(), {passed} passed and at least {required} expected",
                            routine.name
                        ),
                    ));
                }
            },
        };
        bound.push(if param.by_ref {
            Slot::Alias(match slot {
                Slot::Alias(alias) => alias,
                other => match other.into_value()? {
                    PhpValue::Alias(alias) => alias,
                    value => PhpAlias::new(value),
                },
            })
        } else {
            Slot::Value(slot.into_value()?.dereferenced())
        });
    }
    Ok(bound)
}
