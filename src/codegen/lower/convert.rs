use super::LowerContext;
use crate::diagnostics::CompileError;
use crate::il::{Instr, Repr};

impl LowerContext<'_> {
    /// Converts the value on top of the stack from `from` to `to`.
    pub(super) fn convert(&mut self, from: Repr, to: Repr) -> Result<(), CompileError> {
        if from == to {
            return Ok(());
        }
        match (from, to) {
            (Repr::Void, _) => Err(CompileError::invariant(format!("no value to convert to {to}"))),
            (_, Repr::Void) => {
                self.w.emit(Instr::Pop);
                Ok(())
            }
            (_, Repr::Value) => self.to_value(from),
            (_, Repr::Bool) => self.to_bool(from),
            (Repr::Int32 | Repr::Bool | Repr::Double, Repr::Long) => {
                self.w.emit(Instr::ConvI8);
                Ok(())
            }
            (_, Repr::Int32) => {
                self.convert(from, Repr::Long)?;
                self.w.emit(Instr::ConvI4);
                Ok(())
            }
            (Repr::Int32 | Repr::Long | Repr::Bool, Repr::Double) => {
                self.w.emit(Instr::ConvR8);
                Ok(())
            }
            (Repr::Int32, Repr::Number | Repr::String) => {
                self.w.emit(Instr::ConvI8);
                self.convert(Repr::Long, to)
            }
            (Repr::Value | Repr::String | Repr::PhpString | Repr::Number, Repr::Long | Repr::Double) => {
                self.call(helper_for(to), &[from]).map(drop)
            }
            (Repr::Value | Repr::Bool | Repr::Long | Repr::Double | Repr::String | Repr::PhpString, Repr::Number) => {
                self.call("to_number", &[from]).map(drop)
            }
            (
                Repr::Value
                | Repr::Bool
                | Repr::Long
                | Repr::Double
                | Repr::Number
                | Repr::PhpString
                | Repr::Array
                | Repr::Object,
                Repr::String,
            ) => self.call("to_string", &[from]).map(drop),
            (Repr::String | Repr::Value, Repr::PhpString) => self.call("to_php_string", &[from]).map(drop),
            (_, Repr::PhpString) => {
                self.convert(from, Repr::String)?;
                self.call("to_php_string", &[Repr::String]).map(drop)
            }
            (Repr::Value, Repr::Array) => self.call("to_array", &[Repr::Value]).map(drop),
            (Repr::Value, Repr::Object) => self.call("to_object", &[Repr::Value]).map(drop),
            (Repr::Value, Repr::Alias) => self.call("to_alias", &[Repr::Value]).map(drop),
            (Repr::Value, Repr::TypeHandle) => self.call("to_type_handle", &[Repr::Value]).map(drop),
            (Repr::Enumerator | Repr::Delegate | Repr::TypeHandle, _) | (_, Repr::Enumerator | Repr::Delegate) => {
                Err(CompileError::invariant(format!("no conversion from {from} to {to}")))
            }
            // Everything else goes through the generic representation.
            _ => {
                self.to_value(from)?;
                self.convert(Repr::Value, to)
            }
        }
    }

    fn to_value(&mut self, from: Repr) -> Result<(), CompileError> {
        match from {
            Repr::Bool
            | Repr::Int32
            | Repr::Long
            | Repr::Double
            | Repr::String
            | Repr::PhpString
            | Repr::Number
            | Repr::Array
            | Repr::Object
            | Repr::Alias => self.call("to_value", &[from]).map(drop),
            _ => Err(CompileError::invariant(format!("{from} has no generic value"))),
        }
    }

    fn to_bool(&mut self, from: Repr) -> Result<(), CompileError> {
        match from {
            Repr::Int32 | Repr::Long | Repr::Double => {
                self.w.emit(Instr::ConvBool);
                Ok(())
            }
            Repr::Object => {
                self.w.emit(Instr::LdNull);
                self.w.emit(Instr::Ceq);
                self.w.emit(Instr::Not);
                Ok(())
            }
            Repr::Value | Repr::String | Repr::PhpString | Repr::Number | Repr::Array => {
                self.call("to_bool", &[from]).map(drop)
            }
            Repr::Alias => {
                self.to_value(from)?;
                self.call("to_bool", &[Repr::Value]).map(drop)
            }
            _ => Err(CompileError::invariant(format!("{from} has no truth value"))),
        }
    }

    /// Pushes the initial content of a local in representation `repr`.
    pub(super) fn emit_default(&mut self, repr: Repr) -> Result<(), CompileError> {
        match repr {
            Repr::Bool => self.w.emit(Instr::LdBool(false)),
            Repr::Int32 => self.w.emit(Instr::LdI4(0)),
            Repr::Long => self.w.emit(Instr::LdI8(0)),
            Repr::Double => self.w.emit(Instr::LdR8(0.0)),
            Repr::String => self.w.emit(Instr::LdStr(String::new())),
            Repr::PhpString => {
                self.w.emit(Instr::LdStr(String::new()));
                self.call("to_php_string", &[Repr::String])?;
            }
            Repr::Number => {
                self.w.emit(Instr::LdI8(0));
                self.call("to_number", &[Repr::Long])?;
            }
            Repr::Alias => {
                self.w.emit(Instr::LdNull);
                self.call("new_alias", &[Repr::Value])?;
            }
            Repr::Void => return Err(CompileError::invariant("void has no default")),
            _ => self.w.emit(Instr::LdNull),
        }
        Ok(())
    }
}

fn helper_for(to: Repr) -> &'static str {
    match to {
        Repr::Long => "to_long",
        _ => "to_double",
    }
}
