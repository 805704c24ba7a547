use super::object::ObjectRef;
use super::slot::CallSiteShape;
use super::value::PhpValue;
use super::Fault;
use crate::types::QualifiedName;

/// Services a runtime helper may call back into. The evaluator is the production
/// implementation; unit tests use a recording stub.
pub trait RuntimeHost {
    fn echo(&mut self, text: &str);

    /// Warning or notice raised by the program. Never aborts execution.
    fn warn(&mut self, message: &str);

    fn invoke_function(&mut self, name: &str, args: Vec<PhpValue>) -> Result<PhpValue, Fault>;

    fn invoke_method(&mut self, this: ObjectRef, name: &str, args: Vec<PhpValue>) -> Result<PhpValue, Fault>;

    fn invoke_static(&mut self, class: &QualifiedName, name: &str, args: Vec<PhpValue>) -> Result<PhpValue, Fault>;

    fn new_object(&mut self, class: &QualifiedName, args: Vec<PhpValue>) -> Result<ObjectRef, Fault>;

    /// Runs a generator body from its saved state until the next suspension or completion.
    fn resume_generator(&mut self, generator: &ObjectRef) -> Result<(), Fault>;

    fn is_subclass_of(&self, class: &QualifiedName, parent: &QualifiedName) -> bool;

    fn has_method(&self, class: &QualifiedName, name: &str) -> bool;

    /// Called once for every dynamic call-site delegate that gets constructed.
    fn note_call_site_bind(&mut self, shape: &CallSiteShape);

    /// Called when a `foreach` releases its enumerator.
    fn note_enumerator_disposed(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Host with no program behind it: records output and warnings, knows only the
    /// built-in exception hierarchy.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub output: String,
        pub warnings: Vec<String>,
        pub binds: usize,
        pub disposals: usize,
    }

    impl RuntimeHost for RecordingHost {
        fn echo(&mut self, text: &str) {
            self.output.push_str(text);
        }

        fn warn(&mut self, message: &str) {
            self.warnings.push(message.to_string());
        }

        fn invoke_function(&mut self, name: &str, _args: Vec<PhpValue>) -> Result<PhpValue, Fault> {
            Err(Fault::error(format!("Call to undefined function {name}()")))
        }

        fn invoke_method(&mut self, this: ObjectRef, name: &str, _args: Vec<PhpValue>) -> Result<PhpValue, Fault> {
            Err(Fault::error(format!("Call to undefined method {}::{name}()", this.class)))
        }

        fn invoke_static(&mut self, class: &QualifiedName, name: &str, _args: Vec<PhpValue>) -> Result<PhpValue, Fault> {
            Err(Fault::error(format!("Call to undefined method {class}::{name}()")))
        }

        fn new_object(&mut self, class: &QualifiedName, _args: Vec<PhpValue>) -> Result<ObjectRef, Fault> {
            Ok(super::super::PhpObject::new(class.clone()))
        }

        fn resume_generator(&mut self, _generator: &ObjectRef) -> Result<(), Fault> {
            Err(Fault::internal("no generator bodies in a recording host"))
        }

        fn is_subclass_of(&self, class: &QualifiedName, parent: &QualifiedName) -> bool {
            class == parent || (parent.matches("Throwable") && class.as_str().ends_with("Error"))
        }

        fn has_method(&self, _class: &QualifiedName, _name: &str) -> bool {
            false
        }

        fn note_call_site_bind(&mut self, _shape: &CallSiteShape) {
            self.binds += 1;
        }

        fn note_enumerator_disposed(&mut self) {
            self.disposals += 1;
        }
    }
}
