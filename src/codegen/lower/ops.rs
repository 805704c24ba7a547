//! Operators: every binary and unary operator picks the narrowest representation both
//! operands are statically known to have, and falls back to the generic helpers.

use super::LowerContext;
use crate::bound::{BinaryOp, BoundExpr, ExprKind, UnaryOp};
use crate::diagnostics::CompileError;
use crate::il::{Instr, Repr};
use crate::types::TypeRefMask;

/// A value already on the stack together with its inferred types.
#[derive(Debug, Clone, Copy)]
pub(super) struct Operand {
    pub(super) repr: Repr,
    pub(super) mask: TypeRefMask,
}

/// What operator dispatch knows about one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Long,
    Double,
    Number,
    Bool,
    String,
    Array,
    Object,
    Null,
    Value,
}

impl Shape {
    fn of_repr(repr: Repr) -> Shape {
        match repr {
            Repr::Int32 | Repr::Long => Shape::Long,
            Repr::Double => Shape::Double,
            Repr::Number => Shape::Number,
            Repr::Bool => Shape::Bool,
            Repr::String | Repr::PhpString => Shape::String,
            Repr::Array => Shape::Array,
            Repr::Object => Shape::Object,
            _ => Shape::Value,
        }
    }

    /// Values of two different scalar shapes are never identical.
    fn is_exact_scalar(self) -> bool {
        matches!(self, Shape::Long | Shape::Double | Shape::Bool | Shape::String | Shape::Array | Shape::Null)
    }

    /// Operand representation for the comparison helpers.
    fn compare_repr(self) -> Repr {
        match self {
            Shape::Long => Repr::Long,
            Shape::Double => Repr::Double,
            Shape::Number => Repr::Number,
            Shape::String => Repr::String,
            _ => Repr::Value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordering {
    Int,
    Float,
    Helper,
}

fn arith_helper(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Pow => "pow",
        _ => "mod",
    }
}

impl LowerContext<'_> {
    fn shape_of_mask(&self, mask: TypeRefMask) -> Shape {
        let ctx = self.ctx;
        if mask.is_any_type() || mask.is_uninitialized() {
            Shape::Value
        } else if ctx.is_long(mask) {
            Shape::Long
        } else if ctx.is_double(mask) {
            Shape::Double
        } else if ctx.is_number(mask) {
            Shape::Number
        } else if ctx.is_boolean(mask) {
            Shape::Bool
        } else if ctx.is_string(mask) {
            Shape::String
        } else if ctx.is_array(mask) {
            Shape::Array
        } else if ctx.is_object(mask) {
            Shape::Object
        } else if ctx.is_null(mask) {
            Shape::Null
        } else {
            Shape::Value
        }
    }

    pub(super) fn emit_binary(
        &mut self,
        op: BinaryOp,
        left: &BoundExpr,
        right: &BoundExpr,
        result_mask: TypeRefMask,
    ) -> Result<Repr, CompileError> {
        match op {
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                self.emit_logical(op, left, right)?;
                Ok(Repr::Bool)
            }
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Identical | BinaryOp::NotIdentical
                if left.is_null_literal() && !right.is_null_literal() =>
            {
                let r = self.emit_expr(right)?;
                if matches!(op, BinaryOp::Identical | BinaryOp::NotIdentical) {
                    self.null_test_strict(r)?;
                } else {
                    self.null_test_loose(r)?;
                }
                if matches!(op, BinaryOp::NotEq | BinaryOp::NotIdentical) {
                    self.w.emit(Instr::Not);
                }
                Ok(Repr::Bool)
            }
            _ => {
                let repr = self.emit_expr(left)?;
                self.emit_binary_tail(op, Operand { repr, mask: left.mask }, right, result_mask)
            }
        }
    }

    /// `left op right` with `left` already on the stack.
    pub(super) fn emit_binary_tail(
        &mut self,
        op: BinaryOp,
        left: Operand,
        right: &BoundExpr,
        result_mask: TypeRefMask,
    ) -> Result<Repr, CompileError> {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
                self.emit_arith(op, left, right, result_mask)
            }
            BinaryOp::Mod => self.emit_mod(left, right),
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
                self.emit_bitwise(op, left, right)
            }
            BinaryOp::Concat => {
                self.convert(left.repr, Repr::String)?;
                self.emit_expr_as(right, Repr::String)?;
                self.call("concat", &[Repr::String, Repr::String])
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                self.emit_loose_eq(left, right)?;
                if op == BinaryOp::NotEq {
                    self.w.emit(Instr::Not);
                }
                Ok(Repr::Bool)
            }
            BinaryOp::Identical | BinaryOp::NotIdentical => {
                self.emit_strict_eq(left, right)?;
                if op == BinaryOp::NotIdentical {
                    self.w.emit(Instr::Not);
                }
                Ok(Repr::Bool)
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Spaceship => {
                self.emit_relational(op, left, right)
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                self.convert(left.repr, Repr::Bool)?;
                self.emit_condition(right)?;
                self.w.emit(match op {
                    BinaryOp::And => Instr::And,
                    BinaryOp::Or => Instr::Or,
                    _ => Instr::Xor,
                });
                Ok(Repr::Bool)
            }
        }
    }

    /// Pushes the truth value of `e`.
    pub(super) fn emit_condition(&mut self, e: &BoundExpr) -> Result<(), CompileError> {
        match &e.kind {
            ExprKind::Unary { op: UnaryOp::Not, operand } => {
                self.emit_condition(operand)?;
                self.w.emit(Instr::Not);
                Ok(())
            }
            ExprKind::Binary { op: op @ (BinaryOp::And | BinaryOp::Or), left, right } => {
                self.emit_logical(*op, left, right)
            }
            _ => {
                let r = self.emit_expr(e)?;
                self.convert(r, Repr::Bool)
            }
        }
    }

    fn emit_logical(&mut self, op: BinaryOp, left: &BoundExpr, right: &BoundExpr) -> Result<(), CompileError> {
        self.emit_condition(left)?;
        if op == BinaryOp::Xor {
            self.emit_condition(right)?;
            self.w.emit(Instr::Xor);
            return Ok(());
        }
        let end = self.w.define_label();
        self.w.emit(Instr::Dup);
        self.w.emit(if op == BinaryOp::And { Instr::BrFalse(end) } else { Instr::BrTrue(end) });
        self.w.emit(Instr::Pop);
        self.emit_condition(right)?;
        self.w.mark_label(end)
    }

    /// Normalizes the left operand of an arithmetic operator in place.
    fn arith_left(&mut self, repr: Repr) -> Result<Repr, CompileError> {
        match repr {
            Repr::Int32 | Repr::Bool => {
                self.w.emit(Instr::ConvI8);
                Ok(Repr::Long)
            }
            Repr::Long | Repr::Double | Repr::Number | Repr::Value | Repr::Array => Ok(repr),
            Repr::String | Repr::PhpString => {
                self.convert(repr, Repr::String)?;
                self.call("to_number_arith", &[Repr::String])
            }
            _ => {
                self.convert(repr, Repr::Value)?;
                Ok(Repr::Value)
            }
        }
    }

    /// Representation the right operand of an arithmetic operator will be given.
    fn arith_right(&self, mask: TypeRefMask) -> Repr {
        match self.shape_of_mask(mask) {
            Shape::Long | Shape::Bool => Repr::Long,
            Shape::Double => Repr::Double,
            Shape::Number | Shape::String => Repr::Number,
            Shape::Array => Repr::Array,
            _ => Repr::Value,
        }
    }

    /// Emits `e` as a numeric operand of representation `to`; strings are parsed the way
    /// arithmetic parses them.
    fn emit_numeric(&mut self, e: &BoundExpr, to: Repr) -> Result<(), CompileError> {
        let r = self.emit_expr(e)?;
        if matches!(r, Repr::String | Repr::PhpString) && matches!(to, Repr::Number | Repr::Long | Repr::Double) {
            self.convert(r, Repr::String)?;
            self.call("to_number_arith", &[Repr::String])?;
            return self.convert(Repr::Number, to);
        }
        self.convert(r, to)
    }

    fn emit_arith(
        &mut self,
        op: BinaryOp,
        left: Operand,
        right: &BoundExpr,
        result_mask: TypeRefMask,
    ) -> Result<Repr, CompileError> {
        let name = arith_helper(op);
        let l = self.arith_left(left.repr)?;
        let r = self.arith_right(right.mask);
        if matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul) {
            let native = match (l, r) {
                (Repr::Long, Repr::Long) if self.ctx.is_long(result_mask) => Some(Repr::Long),
                (Repr::Double, Repr::Double | Repr::Long) => Some(Repr::Double),
                (Repr::Long, Repr::Double) => {
                    self.w.emit(Instr::ConvR8);
                    Some(Repr::Double)
                }
                _ => None,
            };
            if let Some(t) = native {
                self.emit_numeric(right, t)?;
                self.w.emit(match op {
                    BinaryOp::Add => Instr::Add,
                    BinaryOp::Sub => Instr::Sub,
                    _ => Instr::Mul,
                });
                return Ok(t);
            }
        }
        let (pl, pr) = if self.has_helper(name, &[l, r]) { (l, r) } else { (Repr::Value, Repr::Value) };
        self.convert(l, pl)?;
        self.emit_numeric(right, pr)?;
        self.call(name, &[pl, pr])
    }

    fn emit_mod(&mut self, left: Operand, right: &BoundExpr) -> Result<Repr, CompileError> {
        let l = self.arith_left(left.repr)?;
        let pl = if l == Repr::Long { Repr::Long } else { Repr::Value };
        let pr = if self.arith_right(right.mask) == Repr::Long { Repr::Long } else { Repr::Value };
        let (pl, pr) = if self.has_helper("mod", &[pl, pr]) { (pl, pr) } else { (Repr::Value, Repr::Value) };
        self.convert(l, pl)?;
        self.emit_numeric(right, pr)?;
        self.call("mod", &[pl, pr])
    }

    fn emit_bitwise(&mut self, op: BinaryOp, left: Operand, right: &BoundExpr) -> Result<Repr, CompileError> {
        let l = match left.repr {
            Repr::Int32 | Repr::Bool => {
                self.w.emit(Instr::ConvI8);
                Repr::Long
            }
            other => other,
        };
        let long_pair = l == Repr::Long && self.ctx.is_long(right.mask);
        let name = match op {
            BinaryOp::BitAnd => "bit_and",
            BinaryOp::BitOr => "bit_or",
            BinaryOp::BitXor => "bit_xor",
            BinaryOp::Shl => "shl",
            _ => "shr",
        };
        if long_pair && matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor) {
            self.emit_expr_as(right, Repr::Long)?;
            self.w.emit(match op {
                BinaryOp::BitAnd => Instr::And,
                BinaryOp::BitOr => Instr::Or,
                _ => Instr::Xor,
            });
            return Ok(Repr::Long);
        }
        let p = if long_pair && self.has_helper(name, &[Repr::Long, Repr::Long]) { Repr::Long } else { Repr::Value };
        self.convert(l, p)?;
        self.emit_expr_as(right, p)?;
        self.call(name, &[p, p])
    }

    pub(super) fn emit_unary(&mut self, op: UnaryOp, operand: &BoundExpr, mask: TypeRefMask) -> Result<Repr, CompileError> {
        if op == UnaryOp::Not {
            self.emit_condition(operand)?;
            self.w.emit(Instr::Not);
            return Ok(Repr::Bool);
        }
        let r = self.emit_expr(operand)?;
        let r = match r {
            Repr::Int32 | Repr::Bool => {
                self.w.emit(Instr::ConvI8);
                Repr::Long
            }
            Repr::String | Repr::PhpString if op != UnaryOp::BitNot => {
                self.convert(r, Repr::String)?;
                self.call("to_number_arith", &[Repr::String])?
            }
            other => other,
        };
        match (op, r) {
            (UnaryOp::Plus, Repr::Long | Repr::Double | Repr::Number) => Ok(r),
            (UnaryOp::Neg, Repr::Long) if self.ctx.is_long(mask) => {
                self.w.emit(Instr::Neg);
                Ok(Repr::Long)
            }
            (UnaryOp::Neg, Repr::Double) => {
                self.w.emit(Instr::Neg);
                Ok(Repr::Double)
            }
            (UnaryOp::Neg, Repr::Long | Repr::Number) => self.call("negate", &[r]),
            (UnaryOp::BitNot, Repr::Long) => {
                self.w.emit(Instr::Not);
                Ok(Repr::Long)
            }
            _ => {
                self.convert(r, Repr::Value)?;
                let name = match op {
                    UnaryOp::Neg => "negate",
                    UnaryOp::Plus => "plus",
                    _ => "bit_not",
                };
                self.call(name, &[Repr::Value])
            }
        }
    }

    /// `x == null` for `x` of representation `repr` on the stack.
    pub(super) fn null_test_loose(&mut self, repr: Repr) -> Result<(), CompileError> {
        match repr {
            Repr::Array => self.call("array_is_empty", &[Repr::Array]).map(drop),
            Repr::Object => {
                self.w.emit(Instr::LdNull);
                self.w.emit(Instr::Ceq);
                Ok(())
            }
            Repr::Int32 => {
                self.w.emit(Instr::LdI4(0));
                self.w.emit(Instr::Ceq);
                Ok(())
            }
            Repr::Long => {
                self.w.emit(Instr::LdI8(0));
                self.w.emit(Instr::Ceq);
                Ok(())
            }
            Repr::Double => {
                self.w.emit(Instr::LdR8(0.0));
                self.w.emit(Instr::Ceq);
                Ok(())
            }
            Repr::Bool => {
                self.w.emit(Instr::Not);
                Ok(())
            }
            Repr::Number | Repr::Value => self.call("loose_eq_null", &[repr]).map(drop),
            Repr::String | Repr::PhpString => {
                self.convert(repr, Repr::String)?;
                self.call("string_is_null_or_empty", &[Repr::String]).map(drop)
            }
            _ => {
                self.convert(repr, Repr::Value)?;
                self.call("loose_eq_null", &[Repr::Value]).map(drop)
            }
        }
    }

    /// `x === null` for `x` of representation `repr` on the stack.
    pub(super) fn null_test_strict(&mut self, repr: Repr) -> Result<(), CompileError> {
        match repr {
            r if r.is_reference() && r != Repr::Alias => {
                self.w.emit(Instr::LdNull);
                self.w.emit(Instr::Ceq);
                Ok(())
            }
            Repr::Value => self.call("is_null", &[Repr::Value]).map(drop),
            Repr::Alias => {
                self.convert(repr, Repr::Value)?;
                self.call("is_null", &[Repr::Value]).map(drop)
            }
            _ => {
                self.w.emit(Instr::Pop);
                self.w.emit(Instr::LdBool(false));
                Ok(())
            }
        }
    }

    fn emit_loose_eq(&mut self, left: Operand, right: &BoundExpr) -> Result<(), CompileError> {
        if right.is_null_literal() {
            return self.null_test_loose(left.repr);
        }
        let l = Shape::of_repr(left.repr);
        let r = self.shape_of_mask(right.mask);
        match (l, r) {
            (Shape::Long, Shape::Long) => {
                self.convert(left.repr, Repr::Long)?;
                self.emit_expr_as(right, Repr::Long)?;
                self.w.emit(Instr::Ceq);
            }
            (Shape::Long | Shape::Double, Shape::Long | Shape::Double) => {
                self.convert(left.repr, Repr::Double)?;
                self.emit_expr_as(right, Repr::Double)?;
                self.w.emit(Instr::Ceq);
            }
            (Shape::Bool, _) | (_, Shape::Bool) => {
                self.convert(left.repr, Repr::Bool)?;
                self.emit_expr_as(right, Repr::Bool)?;
                self.w.emit(Instr::Ceq);
            }
            _ => {
                let (pl, pr) = (l.compare_repr(), r.compare_repr());
                let (pl, pr) =
                    if self.has_helper("loose_eq", &[pl, pr]) { (pl, pr) } else { (Repr::Value, Repr::Value) };
                self.convert(left.repr, pl)?;
                self.emit_expr_as(right, pr)?;
                self.call("loose_eq", &[pl, pr])?;
            }
        }
        Ok(())
    }

    fn emit_strict_eq(&mut self, left: Operand, right: &BoundExpr) -> Result<(), CompileError> {
        if right.is_null_literal() {
            return self.null_test_strict(left.repr);
        }
        let native = Shape::of_repr(left.repr);
        let l = if native == Shape::Value { self.shape_of_mask(left.mask) } else { native };
        let r = self.shape_of_mask(right.mask);
        if l.is_exact_scalar() && r.is_exact_scalar() && l != r {
            let rr = self.emit_expr(right)?;
            if rr != Repr::Void {
                self.w.emit(Instr::Pop);
            }
            self.w.emit(Instr::Pop);
            self.w.emit(Instr::LdBool(false));
            return Ok(());
        }
        match (native, r) {
            (Shape::Long, Shape::Long) => {
                self.convert(left.repr, Repr::Long)?;
                self.emit_expr_as(right, Repr::Long)?;
                self.w.emit(Instr::Ceq);
            }
            (Shape::Double, Shape::Double) | (Shape::Bool, Shape::Bool) => {
                self.emit_expr_as(right, left.repr)?;
                self.w.emit(Instr::Ceq);
            }
            (Shape::String, Shape::String) => {
                self.convert(left.repr, Repr::String)?;
                self.emit_expr_as(right, Repr::String)?;
                self.call("strict_eq", &[Repr::String, Repr::String])?;
            }
            _ => {
                self.convert(left.repr, Repr::Value)?;
                self.emit_expr_as(right, Repr::Value)?;
                self.call("strict_eq", &[Repr::Value, Repr::Value])?;
            }
        }
        Ok(())
    }

    /// `<`, `<=`, `>`, `>=` and `<=>`.
    ///
    /// `a > b` is evaluated as `b < a` and `a >= b` as `b <= a`, so each operator is
    /// false whenever either side is NaN, natively and through the helper alike.
    fn emit_relational(&mut self, op: BinaryOp, left: Operand, right: &BoundExpr) -> Result<Repr, CompileError> {
        let l = Shape::of_repr(left.repr);
        let r = self.shape_of_mask(right.mask);
        let ordering = match (l, r) {
            _ if op == BinaryOp::Spaceship => Ordering::Helper,
            (Shape::Long, Shape::Long) => Ordering::Int,
            (Shape::Long | Shape::Double, Shape::Long | Shape::Double) => Ordering::Float,
            _ => Ordering::Helper,
        };
        let (pl, pr) = match ordering {
            Ordering::Int => (Repr::Long, Repr::Long),
            Ordering::Float => (Repr::Double, Repr::Double),
            Ordering::Helper => {
                let (a, b) = (l.compare_repr(), r.compare_repr());
                if self.has_helper("compare", &[a, b]) && self.has_helper("compare", &[b, a]) {
                    (a, b)
                } else {
                    (Repr::Value, Repr::Value)
                }
            }
        };
        self.convert(left.repr, pl)?;
        let swapped = matches!(op, BinaryOp::Gt | BinaryOp::Ge);
        let (first, second) = if swapped {
            let t = self.temps.acquire(self.w, pl);
            self.w.emit(Instr::StLoc(t.id()));
            self.emit_expr_as(right, pr)?;
            self.w.emit(Instr::LdLoc(t.id()));
            self.temps.release(t);
            (pr, pl)
        } else {
            self.emit_expr_as(right, pr)?;
            (pl, pr)
        };
        match (op, ordering) {
            (BinaryOp::Spaceship, _) => {
                self.call("compare", &[first, second])?;
                self.w.emit(Instr::ConvI8);
                return Ok(Repr::Long);
            }
            (BinaryOp::Lt | BinaryOp::Gt, Ordering::Int | Ordering::Float) => self.w.emit(Instr::Clt),
            (BinaryOp::Lt | BinaryOp::Gt, Ordering::Helper) => {
                self.call("compare", &[first, second])?;
                self.w.emit(Instr::LdI4(0));
                self.w.emit(Instr::Clt);
            }
            (_, Ordering::Int) => {
                self.w.emit(Instr::Cgt);
                self.w.emit(Instr::Not);
            }
            (_, Ordering::Float) => {
                self.w.emit(Instr::CgtUn);
                self.w.emit(Instr::Not);
            }
            (_, Ordering::Helper) => {
                self.call("compare", &[first, second])?;
                self.w.emit(Instr::LdI4(0));
                self.w.emit(Instr::Cgt);
                self.w.emit(Instr::Not);
            }
        }
        Ok(Repr::Bool)
    }
}
