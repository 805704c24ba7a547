//! Calls. A callee the symbol table resolves is called directly; anything else goes
//! through a lazily bound call-site delegate cached in a per-routine slot.

use tracing::trace;

use super::LowerContext;
use crate::bound::{BoundExpr, CallTarget, ClassRef, ExprKind, MemberName, VariableName};
use crate::diagnostics::CompileError;
use crate::il::{Instr, Repr};
use crate::runtime::{CallSiteFlags, CallSiteKind, CallSiteShape};
use crate::symbols::ParamSymbol;
use crate::types::QualifiedName;

/// Leading operands of a dynamic call, pushed between the delegate and the arguments.
enum Operand<'e> {
    Instance(&'e BoundExpr),
    TypeHandle(&'e ClassRef),
    NameExpr(&'e BoundExpr),
}

impl LowerContext<'_> {
    pub(super) fn emit_call(&mut self, target: &CallTarget, args: &[BoundExpr]) -> Result<Repr, CompileError> {
        let symbols = self.symbols;
        let argc = self.argc(args.len())?;
        match target {
            CallTarget::Function { name } => match symbols.resolve_function(name) {
                Some(f) => {
                    self.emit_arguments(&f.params, args)?;
                    self.w.emit(Instr::CallRoutine { name: f.name.clone(), argc });
                    Ok(Repr::Value)
                }
                None => self.emit_site(CallSiteKind::Function, Some(name), &[], args),
            },
            CallTarget::FunctionExpr { callee } => {
                self.emit_site(CallSiteKind::Function, None, &[Operand::NameExpr(callee)], args)
            }
            CallTarget::Method { instance, name } => {
                let resolved = match (self.known_class(instance), name) {
                    (Some(class), MemberName::Static(n)) => symbols
                        .find_method(&class, n)
                        .filter(|(_, m)| !m.is_static)
                        .map(|(_, m)| m),
                    _ => None,
                };
                if let Some(m) = resolved {
                    self.emit_expr_as(instance, Repr::Object)?;
                    self.emit_arguments(&m.params, args)?;
                    self.w.emit(Instr::CallMethod { name: m.name.clone(), argc });
                    return Ok(Repr::Value);
                }
                match name {
                    MemberName::Static(n) => {
                        self.emit_site(CallSiteKind::InstanceMethod, Some(n), &[Operand::Instance(instance)], args)
                    }
                    MemberName::Dynamic(n) => self.emit_site(
                        CallSiteKind::InstanceMethod,
                        None,
                        &[Operand::Instance(instance), Operand::NameExpr(n)],
                        args,
                    ),
                }
            }
            CallTarget::StaticMethod { class, name } => {
                if let (ClassRef::Named(q), MemberName::Static(n)) = (class, name) {
                    if let Some((decl, m)) = symbols.find_method(q, n) {
                        self.emit_arguments(&m.params, args)?;
                        self.w.emit(Instr::CallRoutine { name: format!("{}::{}", decl.name, m.name), argc });
                        return Ok(Repr::Value);
                    }
                }
                match name {
                    MemberName::Static(n) => {
                        self.emit_site(CallSiteKind::StaticMethod, Some(n), &[Operand::TypeHandle(class)], args)
                    }
                    MemberName::Dynamic(n) => self.emit_site(
                        CallSiteKind::StaticMethod,
                        None,
                        &[Operand::TypeHandle(class), Operand::NameExpr(n)],
                        args,
                    ),
                }
            }
        }
    }

    fn argc(&self, n: usize) -> Result<u16, CompileError> {
        u16::try_from(n).map_err(|_| self.unsupported(format!("call with {n} arguments")))
    }

    /// Class of the instance when flow analysis pinned it to exactly one.
    pub(super) fn known_class(&self, instance: &BoundExpr) -> Option<QualifiedName> {
        if matches!(instance.kind, ExprKind::Variable(VariableName::This)) {
            return self.ctx.self_type().cloned();
        }
        let mask = instance.mask;
        if mask.is_any_type() || mask.is_uninitialized() || !self.ctx.is_object(mask) {
            return None;
        }
        match self.ctx.get_types(mask).as_slice() {
            [t] => t.class_name().cloned(),
            _ => None,
        }
    }

    /// Pushes the arguments: aliases for by-reference parameters, values otherwise.
    pub(super) fn emit_arguments(&mut self, params: &[ParamSymbol], args: &[BoundExpr]) -> Result<(), CompileError> {
        for (i, arg) in args.iter().enumerate() {
            let by_ref = arg.access.is_read_ref() || params.get(i).is_some_and(|p| p.by_ref);
            if by_ref {
                self.emit_alias_of(arg)?;
            } else {
                self.emit_expr_as(arg, Repr::Value)?;
            }
        }
        Ok(())
    }

    fn emit_site(
        &mut self,
        kind: CallSiteKind,
        name: Option<&str>,
        operands: &[Operand<'_>],
        args: &[BoundExpr],
    ) -> Result<Repr, CompileError> {
        let mut flags = CallSiteFlags::empty();
        for op in operands {
            flags |= match op {
                Operand::Instance(_) => CallSiteFlags::HAS_INSTANCE,
                Operand::TypeHandle(_) => CallSiteFlags::HAS_TYPE_HANDLE,
                Operand::NameExpr(_) => CallSiteFlags::HAS_NAME_EXPR,
            };
        }
        let shape = CallSiteShape { kind, argc: self.argc(args.len())?, flags, name: name.map(str::to_string) };
        let operand_count = self.argc(shape.operand_count())?;

        let site = self.w.declare_call_site();
        trace!(site, ?kind, name = name.unwrap_or("<dynamic>"), argc = shape.argc, "call site");
        let bound = self.w.define_label();
        self.w.emit(Instr::LdSite(site));
        self.w.emit(Instr::Dup);
        self.w.emit(Instr::BrTrue(bound));
        self.w.emit(Instr::Pop);
        self.w.emit(Instr::LdI4(kind.code()));
        self.w.emit(Instr::LdI4(i32::from(shape.argc)));
        self.w.emit(Instr::LdI4(flags.bits() as i32));
        self.w.emit(Instr::LdStr(name.unwrap_or_default().to_string()));
        self.call("bind_call_site", &[Repr::Int32, Repr::Int32, Repr::Int32, Repr::String])?;
        self.w.emit(Instr::Dup);
        self.w.emit(Instr::StSite(site));
        self.w.mark_label(bound)?;

        // Leading operands go in flag order whatever order they were listed in.
        for wanted in [CallSiteFlags::HAS_INSTANCE, CallSiteFlags::HAS_TYPE_HANDLE, CallSiteFlags::HAS_NAME_EXPR] {
            for op in operands {
                match op {
                    Operand::Instance(e) if wanted == CallSiteFlags::HAS_INSTANCE => {
                        self.emit_expr_as(e, Repr::Value)?;
                    }
                    Operand::TypeHandle(class) if wanted == CallSiteFlags::HAS_TYPE_HANDLE => match class {
                        ClassRef::Named(q) => self.w.emit(Instr::LdTypeHandle(q.clone())),
                        ClassRef::Expr(e) => self.emit_expr_as(e, Repr::TypeHandle)?,
                    },
                    Operand::NameExpr(e) if wanted == CallSiteFlags::HAS_NAME_EXPR => {
                        self.emit_expr_as(e, Repr::Value)?;
                    }
                    _ => {}
                }
            }
        }
        for arg in args {
            if arg.access.is_read_ref() {
                self.emit_alias_of(arg)?;
            } else {
                self.emit_expr_as(arg, Repr::Value)?;
            }
        }
        self.w.emit(Instr::InvokeDelegate { argc: operand_count });
        Ok(Repr::Value)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::with_routine;
    use crate::bound::builder::{ModuleBuilder, RoutineBuilder};
    use crate::bound::BoundModule;
    use crate::config::CodegenOptions;
    use crate::il::{Instr, Repr};
    use crate::runtime::HelperLibrary;
    use crate::symbols::{ClassSymbol, FunctionSymbol, ParamSymbol};

    fn lower_first(module: &BoundModule) -> crate::il::RoutineBody {
        let helpers = HelperLibrary::standard();
        super::super::lower_routine(&module.routines[0], &module.symbols, &helpers, &CodegenOptions::default())
            .unwrap()
    }

    #[test]
    fn test_unresolved_function_binds_a_site_once() {
        let rb = RoutineBuilder::function("f");
        let e = rb.call("missing", vec![rb.int(1), rb.int(2)]);
        let body = with_routine(&rb.build(), |cx| cx.emit_expr(&e).map(drop));
        assert_eq!(body.call_sites, 1);
        assert!(body.instrs.contains(&Instr::LdStr("missing".into())));
        assert!(body.instrs.contains(&Instr::InvokeDelegate { argc: 2 }));
        let site = body.instrs.iter().position(|i| matches!(i, Instr::LdSite(0))).unwrap();
        assert_eq!(body.instrs[site + 1], Instr::Dup);
        assert!(matches!(body.instrs[site + 2], Instr::BrTrue(_)));
    }

    #[test]
    fn test_resolved_function_is_called_directly_with_aliases() {
        let mut module = ModuleBuilder::new();
        let mut rb = RoutineBuilder::function("caller");
        let b = rb.block();
        let x = rb.var("x");
        let call = rb.call("swap", vec![x]);
        rb.expr(b, call);
        rb.ret(b, None);
        module.routine(rb.build());
        let mut modb = module.finish();
        modb.symbols.declare_function(FunctionSymbol {
            name: "swap".into(),
            params: vec![ParamSymbol { name: "a".into(), by_ref: true, has_default: false }],
            is_generator: false,
        });
        let body = lower_first(&modb);
        assert!(body.instrs.contains(&Instr::CallRoutine { name: "swap".into(), argc: 1 }));
        assert_eq!(body.call_sites, 0);
        // `$x` is stored as an alias up front, so the argument is the slot itself.
        let x = body.locals.iter().find(|l| l.name.as_deref() == Some("x")).unwrap();
        assert_eq!(x.repr, Repr::Alias);
        assert!(!body.instrs.iter().any(|i| matches!(i, Instr::Call(h) if h.name == "to_alias")));
    }

    #[test]
    fn test_method_on_this_of_known_class_is_direct() {
        let mut module = ModuleBuilder::new();
        module.class(ClassSymbol::new("Counter"));
        let mut tick = RoutineBuilder::method("Counter", "tick");
        let b = tick.block();
        tick.ret(b, None);
        let mut run = RoutineBuilder::method("Counter", "run");
        let b = run.block();
        let this = run.this();
        let call = run.method_call(this, "tick", vec![]);
        run.expr(b, call);
        run.ret(b, None);
        module.routine(run.build()).routine(tick.build());
        let body = lower_first(&module.finish());
        assert!(body.instrs.contains(&Instr::CallMethod { name: "tick".into(), argc: 0 }));
        assert!(body.instrs.contains(&Instr::LdThis));
    }

    #[test]
    fn test_dynamic_static_call_passes_type_handle_operand() {
        let mut rb = RoutineBuilder::function("f");
        let cls = rb.var("cls");
        let e = rb.static_call_dyn(cls, "make", vec![rb.int(1)]);
        let body = with_routine(&rb.build(), |cx| cx.emit_expr(&e).map(drop));
        assert!(body.instrs.iter().any(|i| matches!(i, Instr::Call(h) if h.name == "to_type_handle")));
        assert!(body.instrs.contains(&Instr::InvokeDelegate { argc: 2 }));
        assert!(body.instrs.contains(&Instr::LdI4(2)));
    }
}
