//! State shared between a generator object and the routine body it suspends.
//!
//! The generated body owns the control flow: it records the resumption index in
//! [`GeneratorState::state`] before unwinding and dispatches on it when re-entered. The
//! functions here implement the `Generator` methods on top of that protocol.

use std::cell::RefMut;

use super::object::ObjectRef;
use super::slot::Slot;
use super::value::PhpValue;
use super::{Fault, PhpException, RuntimeHost};

pub const NOT_STARTED: i32 = 0;
pub const FINISHED: i32 = -1;
pub const RUNNING: i32 = -2;

/// Locals and arguments of a suspended generator body.
#[derive(Debug, Clone, Default)]
pub struct GeneratorFrame {
    pub routine: String,
    pub args: Vec<Slot>,
    pub locals: Vec<Slot>,
    pub this: Option<ObjectRef>,
}

#[derive(Debug)]
pub struct GeneratorState {
    /// `None` while the body runs, and after it finished.
    pub frame: Option<GeneratorFrame>,
    /// `0` before the first resume, the 1-based yield index while suspended, `-2` while
    /// running and `-1` once finished.
    pub state: i32,
    pub current: PhpValue,
    pub key: PhpValue,
    pub sent: PhpValue,
    pub return_value: Option<PhpValue>,
    /// Set while a yield unwinds out of the body; finally handlers skip themselves.
    pub suspending: bool,
    pub pending_exception: Option<PhpException>,
    largest_int_key: i64,
    at_first_yield: bool,
}

impl GeneratorState {
    pub fn new(frame: GeneratorFrame) -> Self {
        GeneratorState {
            frame: Some(frame),
            state: NOT_STARTED,
            current: PhpValue::Null,
            key: PhpValue::Null,
            sent: PhpValue::Null,
            return_value: None,
            suspending: false,
            pending_exception: None,
            largest_int_key: -1,
            at_first_yield: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == FINISHED
    }

    /// Key of a key-less yield.
    pub fn next_auto_key(&mut self) -> PhpValue {
        self.largest_int_key += 1;
        self.key = PhpValue::Long(self.largest_int_key);
        self.key.clone()
    }

    pub fn set_key(&mut self, key: PhpValue) {
        let key = key.dereferenced();
        if let PhpValue::Long(l) = key {
            if l > self.largest_int_key {
                self.largest_int_key = l;
            }
        }
        self.key = key;
    }

    pub fn finish(&mut self) {
        self.state = FINISHED;
        self.frame = None;
        self.current = PhpValue::Null;
        self.key = PhpValue::Null;
        self.suspending = false;
    }
}

pub fn state_of(generator: &ObjectRef) -> Result<RefMut<'_, GeneratorState>, Fault> {
    match generator.generator() {
        Some(cell) => cell
            .try_borrow_mut()
            .map_err(|_| Fault::internal("generator state borrowed twice")),
        None => Err(Fault::internal(format!("{} is not a generator", generator.class))),
    }
}

fn resume(host: &mut dyn RuntimeHost, generator: &ObjectRef) -> Result<(), Fault> {
    {
        let mut st = state_of(generator)?;
        if st.is_finished() {
            return Ok(());
        }
        if st.state == RUNNING {
            return Err(Fault::error("Cannot resume an already running generator"));
        }
        st.at_first_yield = false;
    }
    host.resume_generator(generator)
}

/// Runs a fresh generator up to its first yield.
pub fn ensure_started(host: &mut dyn RuntimeHost, generator: &ObjectRef) -> Result<(), Fault> {
    if state_of(generator)?.state != NOT_STARTED {
        return Ok(());
    }
    resume(host, generator)?;
    state_of(generator)?.at_first_yield = true;
    Ok(())
}

pub fn current(host: &mut dyn RuntimeHost, generator: &ObjectRef) -> Result<PhpValue, Fault> {
    ensure_started(host, generator)?;
    Ok(state_of(generator)?.current.clone())
}

pub fn key(host: &mut dyn RuntimeHost, generator: &ObjectRef) -> Result<PhpValue, Fault> {
    ensure_started(host, generator)?;
    Ok(state_of(generator)?.key.clone())
}

pub fn valid(host: &mut dyn RuntimeHost, generator: &ObjectRef) -> Result<bool, Fault> {
    ensure_started(host, generator)?;
    Ok(!state_of(generator)?.is_finished())
}

pub fn next(host: &mut dyn RuntimeHost, generator: &ObjectRef) -> Result<(), Fault> {
    ensure_started(host, generator)?;
    state_of(generator)?.sent = PhpValue::Null;
    resume(host, generator)
}

/// Sends `value` as the result of the current yield and returns the next yielded value.
pub fn send(host: &mut dyn RuntimeHost, generator: &ObjectRef, value: PhpValue) -> Result<PhpValue, Fault> {
    ensure_started(host, generator)?;
    {
        let mut st = state_of(generator)?;
        if st.is_finished() {
            return Ok(PhpValue::Null);
        }
        st.sent = value.dereferenced();
    }
    resume(host, generator)?;
    Ok(state_of(generator)?.current.clone())
}

/// Raises `exception` at the suspended yield. A finished generator throws it straight back.
pub fn throw(host: &mut dyn RuntimeHost, generator: &ObjectRef, exception: PhpException) -> Result<PhpValue, Fault> {
    ensure_started(host, generator)?;
    {
        let mut st = state_of(generator)?;
        if st.is_finished() {
            return Err(Fault::Thrown(exception));
        }
        st.pending_exception = Some(exception);
    }
    resume(host, generator)?;
    Ok(state_of(generator)?.current.clone())
}

pub fn rewind(host: &mut dyn RuntimeHost, generator: &ObjectRef) -> Result<(), Fault> {
    ensure_started(host, generator)?;
    let st = state_of(generator)?;
    if !st.at_first_yield && !st.is_finished() {
        return Err(Fault::throw("Exception", "Cannot rewind a generator that was already run"));
    }
    Ok(())
}

pub fn get_return(generator: &ObjectRef) -> Result<PhpValue, Fault> {
    let st = state_of(generator)?;
    match (&st.return_value, st.is_finished()) {
        (Some(v), true) => Ok(v.clone()),
        _ => Err(Fault::throw(
            "Exception",
            "Cannot get return value of a generator that hasn't returned",
        )),
    }
}

/// Takes the exception injected by `throw()`, if any.
pub fn take_pending_exception(generator: &ObjectRef) -> Result<Option<PhpException>, Fault> {
    Ok(state_of(generator)?.pending_exception.take())
}
