//! Property-based test generators using proptest.

use crate::entities::{AttributeType, Group};
use proptest::prelude::*;

/// Strategy for generating attribute names.
pub fn attribute_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_.]{0,23}").expect("Invalid regex")
}

/// Strategy for generating group paths.
pub fn group_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::string::string_regex("[a-z][a-z0-9-]{0,11}").expect("Invalid regex"),
        0..4,
    )
    .prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Strategy for generating attribute types.
pub fn attribute_type_strategy() -> impl Strategy<Value = AttributeType> {
    (
        attribute_name_strategy(),
        ".{0,64}",
        any::<u32>(),
        prop_oneof![Just("string"), Just("integer"), Just("email"), Just("jpegImage")],
    )
        .prop_map(|(name, description, flags, syntax)| AttributeType {
            name,
            description,
            flags,
            syntax: syntax.to_string(),
        })
}

/// Strategy for generating groups.
pub fn group_strategy() -> impl Strategy<Value = Group> {
    (
        group_path_strategy(),
        "[ -~]{0,32}",
        prop::collection::vec("[a-z]{1,8}", 0..4),
    )
        .prop_map(|(path, description, statements)| Group {
            path,
            description,
            statements,
        })
}

/// Strategy for generating attribute types with pairwise distinct names.
pub fn distinct_attribute_types(max: usize) -> impl Strategy<Value = Vec<AttributeType>> {
    prop::collection::btree_map(attribute_name_strategy(), attribute_type_strategy(), 0..max)
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(name, mut attr)| {
                    attr.name = name;
                    attr
                })
                .collect()
        })
}

/// One step of a random DAO workload.
#[derive(Debug, Clone)]
pub enum DaoOp {
    /// Create an attribute type.
    Create(AttributeType),
    /// Update the attribute type with this name, if present.
    Update(AttributeType),
    /// Delete the attribute type with this name, if present.
    Delete(String),
}

/// Strategy for generating DAO workloads over a small name space, so
/// operations collide often.
pub fn dao_ops_strategy(len: usize) -> impl Strategy<Value = Vec<DaoOp>> {
    let name = prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(str::to_string);
    let op = (0u8..3, name, any::<u32>()).prop_map(|(kind, name, flags)| match kind {
        0 => DaoOp::Create(AttributeType::new(name, flags)),
        1 => DaoOp::Update(AttributeType::new(name, flags)),
        _ => DaoOp::Delete(name),
    });
    prop::collection::vec(op, 0..len)
}
