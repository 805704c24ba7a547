//! The fetch/execute loop.

use tracing::trace;

use super::frame::Frame;
use super::{native, Machine};
use crate::il::{GenField, Instr};
use crate::runtime::generator;
use crate::runtime::{Fault, ObjectRef, PhpException, PhpValue, Slot};

enum Step {
    Next,
    Return(Slot),
}

impl<'m> Machine<'m> {
    /// Runs `frame` until it returns. Faults no handler of the frame accepts escape.
    pub(super) fn run_frame(&mut self, frame: &mut Frame<'m>) -> Result<Slot, Fault> {
        trace!(routine = %frame.routine.name, depth = self.depth, "enter");
        self.scopes.push(frame.this.clone());
        let result = self.execute(frame);
        self.scopes.pop();
        result
    }

    fn execute(&mut self, frame: &mut Frame<'m>) -> Result<Slot, Fault> {
        let body = frame.body();
        loop {
            let at = frame.pc;
            let instr = body
                .instrs
                .get(at)
                .ok_or_else(|| Fault::internal(format!("{} ran past its last instruction", frame.routine.name)))?;
            frame.pc += 1;
            let outcome = match instr {
                Instr::EndFinally => {
                    frame.end_finally(at, &|filter, fault| self.filter_matches(filter, fault))?;
                    continue;
                }
                _ => self.step(frame, at, instr),
            };
            match outcome {
                Ok(Step::Next) => {}
                Ok(Step::Return(slot)) => return Ok(slot),
                Err(fault) => frame.unwind(at, fault, &|filter, fault| self.filter_matches(filter, fault))?,
            }
        }
    }

    fn step(&mut self, frame: &mut Frame<'m>, at: usize, instr: &'m Instr) -> Result<Step, Fault> {
        match instr {
            Instr::Nop | Instr::BeginTry | Instr::EndTry | Instr::MarkLabel(_) | Instr::SequencePoint(_) => {}
            Instr::BeginCatch(_) | Instr::BeginFinally | Instr::EndFinally => {
                return Err(Fault::internal(format!("fell into a handler at {at} in {}", frame.routine.name)));
            }

            Instr::LdNull => frame.push(Slot::Null),
            Instr::LdBool(b) => frame.push(Slot::Bool(*b)),
            Instr::LdI4(v) => frame.push(Slot::Int32(*v)),
            Instr::LdI8(v) => frame.push(Slot::Long(*v)),
            Instr::LdR8(v) => frame.push(Slot::Double(*v)),
            Instr::LdStr(s) => frame.push(Slot::String(s.clone())),
            Instr::LdTypeHandle(class) => frame.push(Slot::TypeHandle(class.clone())),
            Instr::LdLoc(id) => {
                let slot = frame
                    .locals
                    .get(id.index())
                    .cloned()
                    .ok_or_else(|| Fault::internal(format!("no local {id} in {}", frame.routine.name)))?;
                frame.push(slot);
            }
            Instr::StLoc(id) => {
                let value = frame.pop()?;
                let repr = frame
                    .body()
                    .locals
                    .get(id.index())
                    .map(|l| l.repr)
                    .ok_or_else(|| Fault::internal(format!("no local {id} in {}", frame.routine.name)))?;
                frame.locals[id.index()] = if value.fits(repr) { value } else { value.conform(repr)? };
            }
            Instr::LdArg(i) => {
                let slot = frame
                    .args
                    .get(usize::from(*i))
                    .cloned()
                    .ok_or_else(|| Fault::internal(format!("no argument {i} in {}", frame.routine.name)))?;
                frame.push(slot);
            }
            Instr::StArg(i) => {
                let value = frame.pop()?;
                let arg = frame
                    .args
                    .get_mut(usize::from(*i))
                    .ok_or_else(|| Fault::internal(format!("no argument {i} in {}", frame.routine.name)))?;
                *arg = value;
            }
            Instr::LdThis => {
                let this = frame.this.clone().ok_or_else(|| Fault::error("Using $this when not in object context"))?;
                frame.push(Slot::Object(this));
            }
            Instr::Dup => {
                let top = frame.pop()?;
                frame.push(top.clone());
                frame.push(top);
            }
            Instr::Pop => {
                frame.pop()?;
            }

            Instr::Add | Instr::Sub | Instr::Mul => {
                let (a, b) = pop2(frame)?;
                frame.push(native::arith(instr, a, b)?);
            }
            Instr::And | Instr::Or | Instr::Xor => {
                let (a, b) = pop2(frame)?;
                frame.push(native::bitwise(instr, a, b)?);
            }
            Instr::Ceq => {
                let (a, b) = pop2(frame)?;
                frame.push(native::ceq(instr, a, b)?);
            }
            Instr::Clt | Instr::Cgt | Instr::CltUn | Instr::CgtUn => {
                let (a, b) = pop2(frame)?;
                frame.push(native::compare(instr, a, b)?);
            }
            Instr::Neg => {
                let a = frame.pop()?;
                frame.push(native::neg(instr, a)?);
            }
            Instr::Not => {
                let a = frame.pop()?;
                frame.push(native::not(instr, a)?);
            }
            Instr::ConvI4 | Instr::ConvI8 | Instr::ConvR8 | Instr::ConvBool => {
                let a = frame.pop()?;
                frame.push(native::convert(instr, a)?);
            }

            Instr::Br(label) => frame.pc = frame.target(*label)?,
            Instr::BrTrue(label) | Instr::BrFalse(label) => {
                let taken = frame.pop()?.is_truthy()? == matches!(instr, Instr::BrTrue(_));
                if taken {
                    frame.pc = frame.target(*label)?;
                }
            }
            Instr::Switch(targets) => {
                let index = frame.pop()?.as_i32()?;
                if let Some(label) = usize::try_from(index).ok().and_then(|i| targets.get(i)) {
                    frame.pc = frame.target(*label)?;
                }
            }
            Instr::Leave(label) => {
                let target = frame.target(*label)?;
                frame.leave(at, target)?;
            }
            Instr::Ret => return Ok(Step::Return(frame.stack.pop().unwrap_or(Slot::Void))),
            Instr::Throw => {
                return Err(match frame.pop()?.into_object_opt()? {
                    Some(obj) => Fault::Thrown(PhpException(obj)),
                    None => Fault::error("Can only throw objects"),
                });
            }
            Instr::Rethrow => return Err(frame.caught_at(at).unwrap_or_else(|internal| internal)),

            Instr::Call(helper) => {
                let args = frame.pop_n(helper.params.len())?;
                let helpers = self.helpers;
                let result = helpers.invoke(helper.id, self, args)?;
                if !matches!(result, Slot::Void) {
                    frame.push(result);
                }
            }
            Instr::CallRoutine { name, argc } => {
                let args = frame.pop_n(usize::from(*argc))?;
                let image = self.image;
                let routine = image.routine(name).ok_or_else(|| match name.split_once("::") {
                    Some((class, method)) => Fault::error(format!("Call to undefined method {class}::{method}()")),
                    None => Fault::error(format!("Call to undefined function {name}()")),
                })?;
                let this = match (&routine.class, &frame.this) {
                    (Some(class), Some(this)) if !routine.is_static && image.symbols.is_subclass_of(&this.class, class) => {
                        Some(this.clone())
                    }
                    _ => None,
                };
                let result = self.call_compiled(routine, args, this)?;
                frame.push(Slot::Value(result));
            }
            Instr::CallMethod { name, argc } => {
                let args = frame.pop_n(usize::from(*argc))?;
                let receiver = receiver(frame.pop()?, name)?;
                let result = self.call_method(receiver, name, args)?;
                frame.push(Slot::Value(result));
            }
            Instr::NewObj { class, argc } => {
                let args = frame.pop_n(usize::from(*argc))?;
                let obj = self.instantiate(class, args)?;
                frame.push(Slot::Object(obj));
            }
            Instr::InvokeDelegate { argc } => {
                let operands = frame.pop_n(usize::from(*argc))?;
                let delegate = frame.pop()?.into_delegate()?;
                let result = self.invoke_delegate(&delegate, operands)?;
                frame.push(Slot::Value(result));
            }
            Instr::LdSite(i) => {
                let slot = self
                    .site_slots(frame.routine)
                    .get(*i as usize)
                    .cloned()
                    .ok_or_else(|| Fault::internal(format!("no call site {i} in {}", frame.routine.name)))?;
                frame.push(slot);
            }
            Instr::StSite(i) => {
                let value = frame.pop()?;
                let routine = frame.routine;
                let site = self
                    .site_slots(routine)
                    .get_mut(*i as usize)
                    .ok_or_else(|| Fault::internal(format!("no call site {i} in {}", routine.name)))?;
                *site = value;
            }

            Instr::LdGenerator => {
                let generator = current_generator(frame)?;
                frame.push(Slot::Object(generator));
            }
            Instr::LdGenField(field) => {
                let generator = current_generator(frame)?;
                let st = generator::state_of(&generator)?;
                let slot = match field {
                    GenField::State => Slot::Int32(st.state),
                    GenField::Current => Slot::Value(st.current.clone()),
                    GenField::Key => Slot::Value(st.key.clone()),
                    GenField::Sent => Slot::Value(st.sent.clone()),
                    GenField::Return => Slot::Value(st.return_value.clone().unwrap_or_default()),
                    GenField::Suspending => Slot::Bool(st.suspending),
                };
                drop(st);
                frame.push(slot);
            }
            Instr::StGenField(field) => {
                let value = frame.pop()?;
                let generator = current_generator(frame)?;
                let mut st = generator::state_of(&generator)?;
                match field {
                    GenField::State => st.state = value.as_i32()?,
                    GenField::Suspending => st.suspending = value.as_bool()?,
                    GenField::Current => st.current = value.into_value()?.dereferenced(),
                    GenField::Key => st.set_key(value.into_value()?.dereferenced()),
                    GenField::Sent => st.sent = value.into_value()?.dereferenced(),
                    GenField::Return => st.return_value = Some(value.into_value()?.dereferenced()),
                }
            }
        }
        Ok(Step::Next)
    }
}

/// Pops the two operands of a binary instruction, left first.
fn pop2(frame: &mut Frame<'_>) -> Result<(Slot, Slot), Fault> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    Ok((a, b))
}

fn receiver(slot: Slot, method: &str) -> Result<ObjectRef, Fault> {
    match slot.into_value()?.dereferenced() {
        PhpValue::Object(obj) => Ok(obj),
        other => Err(Fault::error(format!("Call to a member function {method}() on {}", other.type_name()))),
    }
}

fn current_generator(frame: &Frame<'_>) -> Result<ObjectRef, Fault> {
    frame
        .generator
        .clone()
        .ok_or_else(|| Fault::internal(format!("{} is not running as a generator", frame.routine.name)))
}
