//! Construction API for bound graphs, for fixtures and hand-written test programs.
//!
//! The builder plays the part of the binder: it attaches access flags the way binding
//! would (targets are writes, sources of assignments are copying reads) and derives a
//! plausible result mask for operators from the operand masks.

use indexmap::IndexMap;

use super::access::AccessFlags;
use super::expr::*;
use super::graph::{BlockId, BlockKind, BoundBlock, ControlFlowGraph, Edge, SwitchCase};
use super::routine::{BoundLocal, BoundParam, BoundRoutine};
use super::stmt::{BoundStmt, StmtKind};
use super::BoundModule;
use crate::span::Span;
use crate::symbols::{ClassSymbol, FunctionSymbol, MethodSymbol, ParamSymbol, SymbolTable};
use crate::types::{QualifiedName, TypeRefContext, TypeRefMask};

#[derive(Debug, Default)]
pub struct ModuleBuilder {
    symbols: SymbolTable,
    routines: Vec<BoundRoutine>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder { symbols: SymbolTable::new(), routines: Vec::new() }
    }

    pub fn class(&mut self, class: ClassSymbol) -> &mut Self {
        self.symbols.declare_class(class);
        self
    }

    /// Adds a routine and declares it: functions in the function table, methods on their
    /// (already declared) class.
    pub fn routine(&mut self, routine: BoundRoutine) -> &mut Self {
        let params: Vec<ParamSymbol> = routine
            .params
            .iter()
            .map(|p| ParamSymbol { name: p.name.clone(), by_ref: p.by_ref, has_default: p.default.is_some() })
            .collect();
        match &routine.class {
            None => self.symbols.declare_function(FunctionSymbol {
                name: routine.name.clone(),
                params,
                is_generator: routine.is_generator,
            }),
            Some(class) => {
                let mut sym = self.symbols.class(class).cloned().unwrap_or_else(|| ClassSymbol::new(class.clone()));
                if !sym.methods.iter().any(|m| m.name.eq_ignore_ascii_case(&routine.name)) {
                    sym.methods.push(MethodSymbol {
                        name: routine.name.clone(),
                        params,
                        is_static: routine.is_static,
                        return_class: None,
                    });
                }
                self.symbols.declare_class(sym);
            }
        }
        self.routines.push(routine);
        self
    }

    pub fn finish(self) -> BoundModule {
        BoundModule { routines: self.routines, symbols: self.symbols }
    }
}

/// Builds one routine: its locals, blocks and expressions.
pub struct RoutineBuilder {
    name: String,
    class: Option<QualifiedName>,
    is_static: bool,
    params: Vec<BoundParam>,
    locals: IndexMap<String, TypeRefMask>,
    is_generator: bool,
    uses_indirect_locals: bool,
    return_mask: TypeRefMask,
    ctx: TypeRefContext,
    blocks: Vec<BoundBlock>,
}

impl RoutineBuilder {
    pub fn function(name: &str) -> Self {
        Self::with_context(name, None, TypeRefContext::default())
    }

    pub fn method(class: &str, name: &str) -> Self {
        let class = QualifiedName::new(class);
        let ctx = TypeRefContext::for_class(class.clone(), None, false);
        Self::with_context(name, Some(class), ctx)
    }

    fn with_context(name: &str, class: Option<QualifiedName>, ctx: TypeRefContext) -> Self {
        RoutineBuilder {
            name: name.to_string(),
            class,
            is_static: false,
            params: Vec::new(),
            locals: IndexMap::new(),
            is_generator: false,
            uses_indirect_locals: false,
            return_mask: TypeRefMask::ANY,
            ctx,
            blocks: Vec::new(),
        }
    }

    pub fn ctx(&self) -> &TypeRefContext {
        &self.ctx
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn generator(mut self) -> Self {
        self.is_generator = true;
        self
    }

    pub fn indirect_locals(mut self) -> Self {
        self.uses_indirect_locals = true;
        self
    }

    pub fn param(mut self, name: &str, mask: TypeRefMask) -> Self {
        self.params.push(BoundParam { name: name.into(), by_ref: false, default: None, mask });
        self.locals.insert(name.into(), mask);
        self
    }

    pub fn param_ref(mut self, name: &str) -> Self {
        let mask = TypeRefMask::ANY.with_ref(true);
        self.params.push(BoundParam { name: name.into(), by_ref: true, default: None, mask });
        self.locals.insert(name.into(), mask);
        self
    }

    pub fn param_default(mut self, name: &str, mask: TypeRefMask, default: ConstValue) -> Self {
        self.params.push(BoundParam { name: name.into(), by_ref: false, default: Some(default), mask });
        self.locals.insert(name.into(), mask);
        self
    }

    /// Declares (or re-types) a local.
    pub fn local(&mut self, name: &str, mask: TypeRefMask) -> &mut Self {
        self.locals.insert(name.into(), mask);
        self
    }

    /// Declares a local bound by reference somewhere in the routine.
    pub fn local_ref(&mut self, name: &str) -> &mut Self {
        self.local(name, TypeRefMask::ANY.with_ref(true))
    }

    // Masks

    pub fn long_mask(&self) -> TypeRefMask {
        self.ctx.get_long_type_mask()
    }

    pub fn double_mask(&self) -> TypeRefMask {
        self.ctx.get_double_type_mask()
    }

    pub fn number_mask(&self) -> TypeRefMask {
        self.ctx.get_number_type_mask()
    }

    pub fn bool_mask(&self) -> TypeRefMask {
        self.ctx.get_boolean_type_mask()
    }

    pub fn string_mask(&self) -> TypeRefMask {
        self.ctx.get_string_type_mask()
    }

    pub fn null_mask(&self) -> TypeRefMask {
        self.ctx.get_null_type_mask()
    }

    pub fn array_mask(&self) -> TypeRefMask {
        self.ctx.get_array_type_mask(TypeRefMask::ANY)
    }

    pub fn class_mask(&self, class: &str) -> TypeRefMask {
        self.ctx.get_class_type_mask(QualifiedName::new(class), false)
    }

    // Blocks

    pub fn block(&mut self) -> BlockId {
        self.block_of(BlockKind::Plain)
    }

    pub fn block_of(&mut self, kind: BlockKind) -> BlockId {
        self.blocks.push(BoundBlock { kind, statements: Vec::new(), edge: Edge::Leave { value: None } });
        self.blocks.len() - 1
    }

    pub fn catch_block(&mut self, classes: &[&str], variable: Option<&str>) -> BlockId {
        let variable = match variable {
            Some(name) => {
                let place = self.var(name);
                Some(self.target(place))
            }
            None => None,
        };
        self.block_of(BlockKind::Catch { classes: classes.iter().map(QualifiedName::new).collect(), variable })
    }

    pub fn stmt(&mut self, block: BlockId, kind: StmtKind) -> &mut Self {
        self.stmt_at(block, kind, Span::dummy())
    }

    pub fn stmt_at(&mut self, block: BlockId, kind: StmtKind, span: Span) -> &mut Self {
        if let Some(b) = self.blocks.get_mut(block) {
            b.statements.push(BoundStmt { kind, span });
        }
        self
    }

    /// Expression statement; its value is discarded.
    pub fn expr(&mut self, block: BlockId, e: BoundExpr) -> &mut Self {
        self.stmt(block, StmtKind::Expr(e.with_access(AccessFlags::NONE)))
    }

    pub fn echo(&mut self, block: BlockId, e: BoundExpr) -> &mut Self {
        self.stmt(block, StmtKind::Echo(vec![e]))
    }

    pub fn unset(&mut self, block: BlockId, places: Vec<BoundExpr>) -> &mut Self {
        let places = places.into_iter().map(|p| p.with_access(AccessFlags::UNSET)).collect();
        self.stmt(block, StmtKind::Unset(places))
    }

    pub fn edge(&mut self, block: BlockId, edge: Edge) -> &mut Self {
        if let Some(b) = self.blocks.get_mut(block) {
            b.edge = edge;
        }
        self
    }

    pub fn goto(&mut self, block: BlockId, target: BlockId) -> &mut Self {
        self.edge(block, Edge::Simple { target })
    }

    pub fn branch(&mut self, block: BlockId, condition: BoundExpr, true_target: BlockId, false_target: BlockId) -> &mut Self {
        self.edge(block, Edge::Conditional { condition, true_target, false_target })
    }

    pub fn ret(&mut self, block: BlockId, value: Option<BoundExpr>) -> &mut Self {
        let value = value.map(|v| self.copied(v));
        self.edge(block, Edge::Leave { value })
    }

    pub fn throw(&mut self, block: BlockId, value: BoundExpr) -> &mut Self {
        self.edge(block, Edge::Throw { value })
    }

    pub fn exit(&mut self, block: BlockId, status: Option<BoundExpr>) -> &mut Self {
        self.edge(block, Edge::Exit { status })
    }

    pub fn try_catch(
        &mut self,
        block: BlockId,
        body: BlockId,
        catches: Vec<BlockId>,
        finally: Option<BlockId>,
        next: BlockId,
    ) -> &mut Self {
        self.edge(block, Edge::TryCatch { body, catches, finally, next })
    }

    /// `foreach`: `block` evaluates `enumeree`, `block + 1` advances, `block + 2` starts
    /// the body, and `next` follows the loop.
    pub fn foreach(
        &mut self,
        block: BlockId,
        enumeree: BoundExpr,
        value: BoundExpr,
        key: Option<BoundExpr>,
        by_ref: bool,
        next: BlockId,
    ) -> &mut Self {
        let move_next = block + 1;
        let value_access = if by_ref { AccessFlags::WRITE_REF } else { AccessFlags::WRITE };
        let value = value.with_access(value_access);
        let key = key.map(|k| k.with_access(AccessFlags::WRITE));
        // Only an array enumeree is created in place; anything else is enumerated as found.
        let ensure = by_ref && !enumeree.mask.is_any_type() && self.ctx.is_array(enumeree.mask);
        let enumeree = if ensure { enumeree.with_access(AccessFlags::READ | AccessFlags::ENSURE_ARRAY) } else { enumeree };
        self.edge(block, Edge::ForeachEnumeree { enumeree, move_next });
        self.edge(move_next, Edge::ForeachMoveNext { value, key, by_ref, body: move_next + 1, next })
    }

    pub fn switch(&mut self, block: BlockId, subject: BoundExpr, cases: Vec<(Option<BoundExpr>, BlockId)>, next: BlockId) -> &mut Self {
        let cases = cases.into_iter().map(|(value, block)| SwitchCase { value, block }).collect();
        self.edge(block, Edge::Switch { subject, cases, next })
    }

    // Expressions

    fn expr_of(&self, kind: ExprKind, mask: TypeRefMask) -> BoundExpr {
        BoundExpr::new(kind, mask)
    }

    pub fn null(&self) -> BoundExpr {
        self.expr_of(ExprKind::Literal(ConstValue::Null), self.null_mask())
    }

    pub fn bool(&self, b: bool) -> BoundExpr {
        self.expr_of(ExprKind::Literal(ConstValue::Bool(b)), self.bool_mask())
    }

    pub fn int(&self, v: i64) -> BoundExpr {
        self.expr_of(ExprKind::Literal(ConstValue::Long(v)), self.long_mask())
    }

    pub fn float(&self, v: f64) -> BoundExpr {
        self.expr_of(ExprKind::Literal(ConstValue::Double(v)), self.double_mask())
    }

    pub fn str(&self, v: &str) -> BoundExpr {
        self.expr_of(ExprKind::Literal(ConstValue::String(v.into())), self.string_mask())
    }

    /// Reads local `$name`; undeclared locals are declared with an unknown type.
    pub fn var(&mut self, name: &str) -> BoundExpr {
        let mask = *self.locals.entry(name.to_string()).or_insert(TypeRefMask::ANY);
        self.expr_of(ExprKind::Variable(VariableName::Local(name.into())), mask)
    }

    pub fn indirect(&self, name: BoundExpr) -> BoundExpr {
        self.expr_of(ExprKind::Variable(VariableName::Indirect(Box::new(name))), TypeRefMask::ANY)
    }

    pub fn this(&self) -> BoundExpr {
        let mask = self.ctx.get_self_type_mask();
        self.expr_of(ExprKind::Variable(VariableName::This), mask)
    }

    pub fn item(&self, array: BoundExpr, index: BoundExpr) -> BoundExpr {
        self.expr_of(
            ExprKind::ArrayItem { array: Box::new(array), index: Some(Box::new(index)) },
            TypeRefMask::ANY,
        )
    }

    /// `$a[]`, only valid as a write target.
    pub fn append(&self, array: BoundExpr) -> BoundExpr {
        self.expr_of(ExprKind::ArrayItem { array: Box::new(array), index: None }, TypeRefMask::ANY)
    }

    pub fn field(&self, instance: BoundExpr, name: &str) -> BoundExpr {
        self.expr_of(
            ExprKind::Field { instance: Box::new(instance), name: MemberName::Static(name.into()) },
            TypeRefMask::ANY,
        )
    }

    pub fn field_dyn(&self, instance: BoundExpr, name: BoundExpr) -> BoundExpr {
        self.expr_of(
            ExprKind::Field { instance: Box::new(instance), name: MemberName::Dynamic(Box::new(name)) },
            TypeRefMask::ANY,
        )
    }

    pub fn list(&self, items: Vec<(Option<BoundExpr>, Option<BoundExpr>)>) -> BoundExpr {
        let items = items
            .into_iter()
            .map(|(key, target)| ListItem { key, target: target.map(|t| self.target(t)) })
            .collect();
        self.expr_of(ExprKind::List { items }, TypeRefMask::ANY)
    }

    /// Marks a place as a write target; containers of nested targets are ensured.
    pub fn target(&self, place: BoundExpr) -> BoundExpr {
        let mut place = place.with_access(AccessFlags::WRITE);
        ensure_containers(&mut place, AccessFlags::ENSURE_ARRAY);
        place
    }

    /// Source of an assignment: places are read with copy semantics.
    fn copied(&self, value: BoundExpr) -> BoundExpr {
        if value.is_place() && value.access == AccessFlags::READ {
            value.with_access(AccessFlags::READ | AccessFlags::READ_COPY)
        } else {
            value
        }
    }

    /// Marks an argument or array item as passed by reference.
    pub fn by_ref(&self, place: BoundExpr) -> BoundExpr {
        let mut place = place.with_access(AccessFlags::READ_REF);
        ensure_containers(&mut place, AccessFlags::ENSURE_ARRAY);
        place
    }

    pub fn assign(&self, target: BoundExpr, value: BoundExpr) -> BoundExpr {
        let mask = value.mask;
        let kind = ExprKind::Assign { target: Box::new(self.target(target)), value: Box::new(self.copied(value)) };
        self.expr_of(kind, mask)
    }

    pub fn assign_ref(&self, target: BoundExpr, value: BoundExpr) -> BoundExpr {
        let mut target = target.with_access(AccessFlags::WRITE_REF);
        ensure_containers(&mut target, AccessFlags::ENSURE_ARRAY);
        let value = if value.is_place() { self.by_ref(value) } else { value };
        self.expr_of(ExprKind::AssignRef { target: Box::new(target), value: Box::new(value) }, TypeRefMask::ANY)
    }

    pub fn compound(&self, op: BinaryOp, target: BoundExpr, value: BoundExpr) -> BoundExpr {
        let mask = self.result_mask(op, &target, &value);
        let mut target = target.with_access(AccessFlags::READ | AccessFlags::WRITE);
        ensure_containers(&mut target, AccessFlags::ENSURE_ARRAY);
        self.expr_of(ExprKind::CompoundAssign { op, target: Box::new(target), value: Box::new(value) }, mask)
    }

    pub fn inc_dec(&self, kind: IncDecKind, target: BoundExpr) -> BoundExpr {
        let mask = target.mask;
        let mut target = target.with_access(AccessFlags::READ | AccessFlags::WRITE);
        ensure_containers(&mut target, AccessFlags::ENSURE_ARRAY);
        self.expr_of(ExprKind::IncDec { kind, target: Box::new(target) }, mask)
    }

    /// Plausible result types of `l op r`.
    fn result_mask(&self, op: BinaryOp, l: &BoundExpr, r: &BoundExpr) -> TypeRefMask {
        let ctx = &self.ctx;
        let both = |f: &dyn Fn(TypeRefMask) -> bool| f(l.mask) && f(r.mask);
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                if both(&|m| ctx.is_double(m)) || (both(&|m| ctx.is_number(m)) && (ctx.is_double(l.mask) || ctx.is_double(r.mask))) {
                    ctx.get_double_type_mask()
                } else if both(&|m| ctx.is_number(m)) {
                    ctx.get_number_type_mask()
                } else {
                    TypeRefMask::ANY
                }
            }
            BinaryOp::Div | BinaryOp::Pow => {
                if both(&|m| ctx.is_number(m)) {
                    ctx.get_number_type_mask()
                } else {
                    TypeRefMask::ANY
                }
            }
            BinaryOp::Mod | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
                if both(&|m| ctx.is_long(m)) || op == BinaryOp::Mod {
                    ctx.get_long_type_mask()
                } else {
                    TypeRefMask::ANY
                }
            }
            BinaryOp::Concat => ctx.get_string_type_mask(),
            BinaryOp::Spaceship => ctx.get_long_type_mask(),
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Identical
            | BinaryOp::NotIdentical
            | BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge
            | BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::Xor => ctx.get_boolean_type_mask(),
        }
    }

    pub fn bin(&self, op: BinaryOp, left: BoundExpr, right: BoundExpr) -> BoundExpr {
        let mask = self.result_mask(op, &left, &right);
        self.bin_as(op, left, right, mask)
    }

    /// Binary operation with an explicit result mask, as flow analysis would narrow it.
    pub fn bin_as(&self, op: BinaryOp, left: BoundExpr, right: BoundExpr, mask: TypeRefMask) -> BoundExpr {
        self.expr_of(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, mask)
    }

    pub fn unary(&self, op: UnaryOp, operand: BoundExpr) -> BoundExpr {
        let mask = match op {
            UnaryOp::Not => self.bool_mask(),
            UnaryOp::BitNot if self.ctx.is_long(operand.mask) => self.long_mask(),
            UnaryOp::Neg | UnaryOp::Plus if self.ctx.is_double(operand.mask) => self.double_mask(),
            UnaryOp::Neg | UnaryOp::Plus if self.ctx.is_number(operand.mask) => self.number_mask(),
            _ => TypeRefMask::ANY,
        };
        self.expr_of(ExprKind::Unary { op, operand: Box::new(operand) }, mask)
    }

    pub fn ternary(&self, condition: BoundExpr, if_true: BoundExpr, if_false: BoundExpr) -> BoundExpr {
        let mask = if_true.mask | if_false.mask;
        self.expr_of(
            ExprKind::Conditional {
                condition: Box::new(condition),
                if_true: Some(Box::new(if_true)),
                if_false: Box::new(if_false),
            },
            mask,
        )
    }

    pub fn short_ternary(&self, condition: BoundExpr, if_false: BoundExpr) -> BoundExpr {
        let mask = condition.mask | if_false.mask;
        self.expr_of(
            ExprKind::Conditional { condition: Box::new(condition), if_true: None, if_false: Box::new(if_false) },
            mask,
        )
    }

    pub fn coalesce(&self, left: BoundExpr, right: BoundExpr) -> BoundExpr {
        let left = left.with_access(AccessFlags::READ | AccessFlags::QUIET);
        self.expr_of(ExprKind::Coalesce { left: Box::new(left), right: Box::new(right) }, TypeRefMask::ANY)
    }

    pub fn array(&self, values: Vec<BoundExpr>) -> BoundExpr {
        let items = values
            .into_iter()
            .map(|value| ArrayItemInit { key: None, value: self.copied(value), by_ref: false })
            .collect();
        self.expr_of(ExprKind::ArrayLiteral { items }, self.array_mask())
    }

    pub fn array_kv(&self, pairs: Vec<(BoundExpr, BoundExpr)>) -> BoundExpr {
        let items = pairs
            .into_iter()
            .map(|(key, value)| ArrayItemInit { key: Some(key), value: self.copied(value), by_ref: false })
            .collect();
        self.expr_of(ExprKind::ArrayLiteral { items }, self.array_mask())
    }

    pub fn array_items(&self, items: Vec<ArrayItemInit>) -> BoundExpr {
        self.expr_of(ExprKind::ArrayLiteral { items }, self.array_mask())
    }

    pub fn call(&self, name: &str, args: Vec<BoundExpr>) -> BoundExpr {
        self.expr_of(ExprKind::Call { target: CallTarget::Function { name: name.into() }, args: self.args(args) }, TypeRefMask::ANY)
    }

    pub fn call_expr(&self, callee: BoundExpr, args: Vec<BoundExpr>) -> BoundExpr {
        self.expr_of(
            ExprKind::Call { target: CallTarget::FunctionExpr { callee: Box::new(callee) }, args: self.args(args) },
            TypeRefMask::ANY,
        )
    }

    pub fn method_call(&self, instance: BoundExpr, name: &str, args: Vec<BoundExpr>) -> BoundExpr {
        let target = CallTarget::Method { instance: Box::new(instance), name: MemberName::Static(name.into()) };
        self.expr_of(ExprKind::Call { target, args: self.args(args) }, TypeRefMask::ANY)
    }

    pub fn method_call_dyn(&self, instance: BoundExpr, name: BoundExpr, args: Vec<BoundExpr>) -> BoundExpr {
        let target = CallTarget::Method { instance: Box::new(instance), name: MemberName::Dynamic(Box::new(name)) };
        self.expr_of(ExprKind::Call { target, args: self.args(args) }, TypeRefMask::ANY)
    }

    pub fn static_call(&self, class: &str, name: &str, args: Vec<BoundExpr>) -> BoundExpr {
        let target = CallTarget::StaticMethod {
            class: ClassRef::Named(QualifiedName::new(class)),
            name: MemberName::Static(name.into()),
        };
        self.expr_of(ExprKind::Call { target, args: self.args(args) }, TypeRefMask::ANY)
    }

    pub fn static_call_dyn(&self, class: BoundExpr, name: &str, args: Vec<BoundExpr>) -> BoundExpr {
        let target = CallTarget::StaticMethod {
            class: ClassRef::Expr(Box::new(class)),
            name: MemberName::Static(name.into()),
        };
        self.expr_of(ExprKind::Call { target, args: self.args(args) }, TypeRefMask::ANY)
    }

    fn args(&self, args: Vec<BoundExpr>) -> Vec<BoundExpr> {
        args.into_iter().map(|a| self.copied(a)).collect()
    }

    pub fn new_object(&self, class: &str, args: Vec<BoundExpr>) -> BoundExpr {
        let mask = self.class_mask(class);
        self.expr_of(ExprKind::New { class: QualifiedName::new(class), args: self.args(args) }, mask)
    }

    pub fn cast(&self, kind: CastKind, operand: BoundExpr) -> BoundExpr {
        let mask = match kind {
            CastKind::Long => self.long_mask(),
            CastKind::Double => self.double_mask(),
            CastKind::String => self.string_mask(),
            CastKind::Bool => self.bool_mask(),
            CastKind::Array => self.array_mask(),
            CastKind::Object => self.class_mask("stdClass"),
        };
        self.expr_of(ExprKind::Cast { kind, operand: Box::new(operand) }, mask)
    }

    pub fn isset(&self, targets: Vec<BoundExpr>) -> BoundExpr {
        let targets = targets.into_iter().map(|t| t.with_access(AccessFlags::READ | AccessFlags::QUIET)).collect();
        self.expr_of(ExprKind::Isset { targets }, self.bool_mask())
    }

    pub fn empty(&self, target: BoundExpr) -> BoundExpr {
        let target = target.with_access(AccessFlags::READ | AccessFlags::QUIET);
        self.expr_of(ExprKind::Empty { target: Box::new(target) }, self.bool_mask())
    }

    pub fn instance_of(&self, operand: BoundExpr, class: &str) -> BoundExpr {
        self.expr_of(ExprKind::InstanceOf { operand: Box::new(operand), class: QualifiedName::new(class) }, self.bool_mask())
    }

    pub fn yield_value(&self, value: BoundExpr) -> BoundExpr {
        self.expr_of(ExprKind::Yield { key: None, value: Some(Box::new(value)) }, TypeRefMask::ANY)
    }

    pub fn yield_pair(&self, key: BoundExpr, value: BoundExpr) -> BoundExpr {
        self.expr_of(
            ExprKind::Yield { key: Some(Box::new(key)), value: Some(Box::new(value)) },
            TypeRefMask::ANY,
        )
    }

    pub fn build(self) -> BoundRoutine {
        let locals = self.locals.into_iter().map(|(name, mask)| BoundLocal { name, mask }).collect();
        BoundRoutine {
            name: self.name,
            class: self.class,
            is_static: self.is_static,
            params: self.params,
            locals,
            return_mask: self.return_mask,
            is_generator: self.is_generator,
            uses_indirect_locals: self.uses_indirect_locals,
            ctx: self.ctx,
            cfg: ControlFlowGraph { blocks: self.blocks, start: 0 },
            span: Span::dummy(),
        }
    }
}

/// Containers of a nested write target are read in ensure mode: `$a[1][2] = v` creates
/// `$a[1]` as an array when missing.
fn ensure_containers(place: &mut BoundExpr, mode: AccessFlags) {
    match &mut place.kind {
        ExprKind::ArrayItem { array, .. } => {
            array.access = AccessFlags::READ | mode;
            ensure_containers(array, AccessFlags::ENSURE_ARRAY);
        }
        ExprKind::Field { instance, .. } => {
            instance.access = AccessFlags::READ | AccessFlags::ENSURE_OBJECT;
            ensure_containers(instance, AccessFlags::ENSURE_OBJECT);
        }
        _ => {}
    }
}
