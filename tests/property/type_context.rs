//! Interning and translation properties of per-routine type contexts.

use std::collections::{BTreeSet, HashSet};

use phlow::types::{PrimitiveTypeCode, QualifiedName, TypeRef, TypeRefContext, TypeRefMask, INDICES_COUNT};
use proptest::prelude::*;

/// A scalar or class type; arrays are covered separately.
fn simple_type() -> impl Strategy<Value = TypeRef> {
    prop_oneof![
        prop_oneof![
            Just(PrimitiveTypeCode::Null),
            Just(PrimitiveTypeCode::Boolean),
            Just(PrimitiveTypeCode::Long),
            Just(PrimitiveTypeCode::Double),
            Just(PrimitiveTypeCode::String),
            Just(PrimitiveTypeCode::WritableString),
        ]
        .prop_map(TypeRef::primitive),
        "[A-E][a-z]{0,3}".prop_map(|name| TypeRef::class(QualifiedName::new(name))),
    ]
}

fn union_in(ctx: &TypeRefContext, types: &[TypeRef]) -> TypeRefMask {
    types.iter().fold(TypeRefMask::VOID, |mask, t| mask | ctx.get_type_mask(t.clone(), false))
}

fn members(ctx: &TypeRefContext, mask: TypeRefMask) -> BTreeSet<String> {
    ctx.display(mask).split('|').map(str::to_string).collect()
}

proptest! {
    #[test]
    fn test_interning_is_stable_and_dense(types in prop::collection::vec(simple_type(), 1..40)) {
        let ctx = TypeRefContext::default();
        let first: Vec<TypeRefMask> = types.iter().map(|t| ctx.get_type_mask(t.clone(), false)).collect();
        let again: Vec<TypeRefMask> = types.iter().map(|t| ctx.get_type_mask(t.clone(), false)).collect();
        prop_assert_eq!(&first, &again);

        let distinct: HashSet<&TypeRef> = types.iter().collect();
        prop_assert_eq!(ctx.types_count(), distinct.len());
        for mask in &first {
            prop_assert!(mask.is_single_type());
            let index = mask.indices().next().unwrap();
            prop_assert!(index < ctx.types_count());
        }
    }

    #[test]
    fn test_translation_preserves_members(
        types in prop::collection::vec(simple_type(), 1..12),
        noise in prop::collection::vec(simple_type(), 0..12),
    ) {
        let source = TypeRefContext::default();
        let mask = union_in(&source, &types);
        // Pre-populate the target so the same types land on different bits.
        let target = TypeRefContext::default();
        union_in(&target, &noise);

        let moved = target.add_to_context(&source, mask);
        prop_assert_eq!(members(&target, moved), members(&source, mask));
        prop_assert_eq!(moved.type_count(), mask.type_count());
    }

    #[test]
    fn test_translation_is_idempotent(
        types in prop::collection::vec(simple_type(), 1..12),
        noise in prop::collection::vec(simple_type(), 0..12),
    ) {
        let source = TypeRefContext::default();
        let mask = union_in(&source, &types);
        let target = TypeRefContext::default();
        union_in(&target, &noise);

        let once = target.add_to_context(&source, mask);
        let twice = target.add_to_context(&source, mask);
        prop_assert_eq!(once, twice);
        prop_assert_eq!(source.add_to_context(&source, mask), mask);
    }

    #[test]
    fn test_category_queries_follow_members(types in prop::collection::vec(simple_type(), 1..8)) {
        let ctx = TypeRefContext::default();
        let mask = union_in(&ctx, &types);
        let all = |code: PrimitiveTypeCode| types.iter().all(|t| t.type_code() == Some(code));
        let any = |code: PrimitiveTypeCode| types.iter().any(|t| t.type_code() == Some(code));
        prop_assert_eq!(ctx.is_long(mask), all(PrimitiveTypeCode::Long));
        prop_assert_eq!(ctx.can_be_long(mask), any(PrimitiveTypeCode::Long));
        prop_assert_eq!(ctx.can_be_object(mask), types.iter().any(TypeRef::is_object));
        prop_assert_eq!(ctx.can_be_null(mask), any(PrimitiveTypeCode::Null));
    }

    #[test]
    fn test_array_element_round_trips(types in prop::collection::vec(simple_type(), 1..6)) {
        let ctx = TypeRefContext::default();
        let element = union_in(&ctx, &types);
        let arrays = ctx.get_array_type_mask(element);
        prop_assert!(ctx.is_array(arrays));
        prop_assert_eq!(ctx.get_element_type(arrays).unwrap(), element);
    }
}

#[test]
fn test_saturated_context_degrades_to_any() {
    let ctx = TypeRefContext::default();
    for i in 0..INDICES_COUNT {
        ctx.get_type_mask(TypeRef::class(QualifiedName::new(format!("C{i}"))), false);
    }
    let late = ctx.get_type_mask(TypeRef::primitive(PrimitiveTypeCode::Long), false);
    assert!(late.is_any_type());
    assert!(ctx.is_saturated());
    assert_eq!(ctx.types_count(), INDICES_COUNT);
}
