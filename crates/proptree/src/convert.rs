//! The typed-conversion registry.
//!
//! Maps a compile-time type to a small capability bundle: a type tag, a
//! scalar encode/decode pair, and (for composite values) a structural
//! encode/decode pair that stores the value as indexed children instead of
//! one scalar string. The registry is the [`PropertyValue`] trait — new
//! types extend it by implementing the trait, with no change to node or
//! tree code.

use std::fmt;

use crate::error::Result;
use crate::node::NodeId;
use crate::tree::PropertyTree;

/// Small identifier for the type observed at a typed access.
///
/// Stored per node so cross-access type changes can be detected and
/// reported as `TYPE` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub &'static str);

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A value that can be stored in and read from a property node.
///
/// Plain scalar types only implement [`tag`](Self::tag),
/// [`encode`](Self::encode), and [`decode`](Self::decode); the canonical
/// representation is one scalar string on the node itself. Structural types
/// (fixed-size numeric vectors) additionally set
/// [`STRUCTURAL`](Self::STRUCTURAL) and override the structural pair, which
/// reads and writes indexed children: component `i` lives at child index
/// `i`.
pub trait PropertyValue: Sized {
    /// Whether this type stores itself as indexed children rather than one
    /// scalar string.
    const STRUCTURAL: bool = false;

    /// The type tag recorded on the node at access time.
    fn tag() -> TypeTag;

    /// Canonical textual encoding.
    fn encode(&self) -> String;

    /// Decode canonical text. `None` means the stored text cannot be read
    /// as this type; typed gets then fall back to the caller's default.
    fn decode(raw: &str) -> Option<Self>;

    /// Reconstruct a composite value from the node's children, creating and
    /// materializing them as needed. The default implementation is the
    /// scalar behavior: return the caller's default untouched.
    fn decode_structural(
        _tree: &mut PropertyTree,
        _node: NodeId,
        default: Self,
    ) -> Result<Self> {
        Ok(default)
    }

    /// Write a composite value into the node's children. Only called when
    /// [`STRUCTURAL`](Self::STRUCTURAL) is true.
    fn encode_structural(_tree: &mut PropertyTree, _node: NodeId, _value: &Self) -> Result<()> {
        Ok(())
    }
}

macro_rules! numeric_property {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(
            impl PropertyValue for $ty {
                fn tag() -> TypeTag {
                    TypeTag($tag)
                }

                fn encode(&self) -> String {
                    self.to_string()
                }

                fn decode(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }
            }
        )*
    };
}

numeric_property! {
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    f32 => "f32",
    f64 => "f64",
}

impl PropertyValue for bool {
    fn tag() -> TypeTag {
        TypeTag("bool")
    }

    fn encode(&self) -> String {
        self.to_string()
    }

    /// Accepts the YAML boolean literal set, since values are routinely
    /// hand-edited in the backing document.
    fn decode(raw: &str) -> Option<Self> {
        match raw.trim() {
            "true" | "True" | "TRUE" | "yes" | "Yes" | "YES" | "on" | "On" | "ON" | "1" => {
                Some(true)
            }
            "false" | "False" | "FALSE" | "no" | "No" | "NO" | "off" | "Off" | "OFF" | "0" => {
                Some(false)
            }
            _ => None,
        }
    }
}

impl PropertyValue for String {
    fn tag() -> TypeTag {
        TypeTag("string")
    }

    fn encode(&self) -> String {
        self.clone()
    }

    fn decode(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

macro_rules! vector_property {
    ($($n:literal => $tag:literal),* $(,)?) => {
        $(
            impl PropertyValue for [f32; $n] {
                const STRUCTURAL: bool = true;

                fn tag() -> TypeTag {
                    TypeTag($tag)
                }

                /// Scalar fallback: space-joined components. Used when a
                /// vector value arrives as one scalar from the document.
                fn encode(&self) -> String {
                    self.iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                }

                fn decode(raw: &str) -> Option<Self> {
                    let mut out = [0.0f32; $n];
                    let mut parts = raw.split_whitespace();
                    for slot in out.iter_mut() {
                        *slot = parts.next()?.parse().ok()?;
                    }
                    Some(out)
                }

                fn decode_structural(
                    tree: &mut PropertyTree,
                    node: NodeId,
                    default: Self,
                ) -> Result<Self> {
                    let mut out = default;
                    for (i, slot) in out.iter_mut().enumerate() {
                        let child = tree.child_by_index(node, i)?;
                        *slot = tree.get(child, *slot)?;
                    }
                    Ok(out)
                }

                fn encode_structural(
                    tree: &mut PropertyTree,
                    node: NodeId,
                    value: &Self,
                ) -> Result<()> {
                    for (i, component) in value.iter().enumerate() {
                        let child = tree.child_by_index(node, i)?;
                        tree.set(child, *component)?;
                    }
                    Ok(())
                }
            }
        )*
    };
}

vector_property! {
    3 => "vec3f",
    4 => "vec4f",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_round_trip() {
        assert_eq!(i64::decode(&42i64.encode()), Some(42));
        assert_eq!(f32::decode(&1.5f32.encode()), Some(1.5));
        assert_eq!(f32::decode(" 2.25 "), Some(2.25));
        assert_eq!(i32::decode("not a number"), None);
    }

    #[test]
    fn bool_accepts_yaml_literals() {
        assert_eq!(bool::decode("yes"), Some(true));
        assert_eq!(bool::decode("Off"), Some(false));
        assert_eq!(bool::decode("true"), Some(true));
        assert_eq!(bool::decode("maybe"), None);
    }

    #[test]
    fn string_decode_is_verbatim() {
        assert_eq!(String::decode("  spaced  "), Some("  spaced  ".into()));
    }

    #[test]
    fn vector_scalar_fallback() {
        let v: [f32; 3] = [1.0, 2.5, -3.0];
        assert_eq!(v.encode(), "1 2.5 -3");
        assert_eq!(<[f32; 3]>::decode("1 2.5 -3"), Some(v));
        assert_eq!(<[f32; 3]>::decode("1 2"), None);
    }

    #[test]
    fn tags_are_distinct() {
        assert_ne!(f32::tag(), f64::tag());
        assert_ne!(<[f32; 3]>::tag(), <[f32; 4]>::tag());
    }
}
