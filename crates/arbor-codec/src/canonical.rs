//! The canonical protocol every value and entity type implements.
//!
//! [`Canonical`] bundles the binary codec, the deterministic state hash and
//! the compare-check diff so the three can never disagree about field order.
//! Implementations for primitives, strings, `Vec<T>` and `Option<T>` live
//! here; entity types implement it by folding their fields in declaration
//! order.

use crate::compare::CompareCx;
use crate::hash::StateHasher;
use crate::wire::{Reader, Writer};
use crate::CodecError;

/// Binary codec + deterministic hash + deep compare for one type.
pub trait Canonical {
    /// Append the canonical bytes of `self`.
    fn write(&self, w: &mut Writer);

    /// Decode a fresh value.
    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError>
    where
        Self: Sized;

    /// Fold `self` into `h`, field by field in declaration order.
    fn fold_hash(&self, h: &mut StateHasher);

    /// Record every difference between `self` and `other` at the current path
    /// of `cx`.
    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>);
}

macro_rules! canonical_unsigned {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Canonical for $ty {
            fn write(&self, w: &mut Writer) {
                w.$write(*self);
            }

            fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
                r.$read()
            }

            fn fold_hash(&self, h: &mut StateHasher) {
                h.fold(u64::from(*self));
            }

            fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
                cx.check_value(self, other);
            }
        }
    };
}

macro_rules! canonical_signed {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Canonical for $ty {
            fn write(&self, w: &mut Writer) {
                w.$write(*self);
            }

            fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
                r.$read()
            }

            fn fold_hash(&self, h: &mut StateHasher) {
                h.fold_signed(i64::from(*self));
            }

            fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
                cx.check_value(self, other);
            }
        }
    };
}

canonical_unsigned!(u8, write_u8, read_u8);
canonical_unsigned!(u16, write_u16, read_u16);
canonical_unsigned!(u32, write_u32, read_u32);
canonical_unsigned!(u64, write_u64, read_u64);
canonical_signed!(i32, write_i32, read_i32);
canonical_signed!(i64, write_i64, read_i64);

impl Canonical for bool {
    fn write(&self, w: &mut Writer) {
        w.write_bool(*self);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        r.read_bool()
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold(u64::from(*self));
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        cx.check_value(self, other);
    }
}

impl Canonical for f32 {
    fn write(&self, w: &mut Writer) {
        w.write_f32(*self);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        r.read_f32()
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold(u64::from(self.to_bits()));
    }

    // Bitwise, so a NaN that survives a round trip still compares equal.
    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        if self.to_bits() != other.to_bits() {
            cx.report(format!("{self:?} != {other:?}"));
        }
    }
}

impl Canonical for f64 {
    fn write(&self, w: &mut Writer) {
        w.write_f64(*self);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        r.read_f64()
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold(self.to_bits());
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        if self.to_bits() != other.to_bits() {
            cx.report(format!("{self:?} != {other:?}"));
        }
    }
}

impl Canonical for String {
    fn write(&self, w: &mut Writer) {
        w.write_str(self);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        r.read_string()
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold_bytes(self.as_bytes());
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        cx.check_value(self, other);
    }
}

impl<T: Canonical> Canonical for Vec<T> {
    fn write(&self, w: &mut Writer) {
        w.write_len(self.len());
        for item in self {
            item.write(w);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let len = r.read_len()?;
        let mut out = Vec::with_capacity(Reader::prealloc(len));
        for _ in 0..len {
            out.push(T::read(r)?);
        }
        Ok(out)
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold(self.len() as u64);
        for item in self {
            item.fold_hash(h);
        }
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        let common = cx.check_len(self.len(), other.len());
        for i in 0..common {
            cx.scope(format!("[{i}]"), |cx| self[i].compare(&other[i], cx));
        }
    }
}

impl<T: Canonical> Canonical for Option<T> {
    fn write(&self, w: &mut Writer) {
        match self {
            None => w.write_u8(0),
            Some(v) => {
                w.write_u8(1);
                v.write(w);
            }
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        if r.read_bool()? {
            Ok(Some(T::read(r)?))
        } else {
            Ok(None)
        }
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        match self {
            None => h.fold(0),
            Some(v) => {
                h.fold(1);
                v.fold_hash(h);
            }
        }
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        match (self, other) {
            (None, None) => {}
            (Some(a), Some(b)) => a.compare(b, cx),
            (Some(_), None) => cx.report("present != absent"),
            (None, Some(_)) => cx.report("absent != present"),
        }
    }
}

// ---------------------------------------------------------------------------
// Polymorphic families
// ---------------------------------------------------------------------------

/// A closed family of concrete types sharing one encoding slot.
///
/// Each variant has a small non-zero type tag; tag `0` is reserved for "no
/// instance". Decoding reads the tag first and dispatches to the matching
/// variant before reading its fields.
pub trait Polymorphic: Sized {
    /// Family name used in diagnostics.
    const FAMILY: &'static str;

    /// Non-zero tag of this value's concrete variant.
    fn type_tag(&self) -> u16;

    /// Write the variant's fields (without the tag).
    fn write_body(&self, w: &mut Writer);

    /// Construct the variant for `tag` and read its fields.
    ///
    /// Returns [`CodecError::UnknownTag`] for a tag outside the family.
    fn read_body(tag: u16, r: &mut Reader<'_>) -> Result<Self, CodecError>;
}

/// Write an optional polymorphic value as tag-then-body (tag `0` = absent).
pub fn write_polymorphic<T: Polymorphic>(w: &mut Writer, value: Option<&T>) {
    match value {
        None => w.write_u16(0),
        Some(v) => {
            debug_assert_ne!(v.type_tag(), 0, "tag 0 is reserved for absent values");
            w.write_u16(v.type_tag());
            v.write_body(w);
        }
    }
}

/// Read an optional polymorphic value written by [`write_polymorphic`].
pub fn read_polymorphic<T: Polymorphic>(r: &mut Reader<'_>) -> Result<Option<T>, CodecError> {
    match r.read_u16()? {
        0 => Ok(None),
        tag => T::read_body(tag, r).map(Some),
    }
}

/// Read a polymorphic value that must be present.
pub fn read_polymorphic_required<T: Polymorphic>(r: &mut Reader<'_>) -> Result<T, CodecError> {
    read_polymorphic(r)?.ok_or(CodecError::UnknownTag {
        family: T::FAMILY,
        tag: 0,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{calculate_hash, from_bytes, to_bytes};

    #[derive(Debug, PartialEq)]
    enum Shape {
        Circle(u32),
        Square(u32, u32),
    }

    impl Polymorphic for Shape {
        const FAMILY: &'static str = "shape";

        fn type_tag(&self) -> u16 {
            match self {
                Shape::Circle(_) => 1,
                Shape::Square(..) => 2,
            }
        }

        fn write_body(&self, w: &mut Writer) {
            match self {
                Shape::Circle(r) => w.write_u32(*r),
                Shape::Square(a, b) => {
                    w.write_u32(*a);
                    w.write_u32(*b);
                }
            }
        }

        fn read_body(tag: u16, r: &mut Reader<'_>) -> Result<Self, CodecError> {
            match tag {
                1 => Ok(Shape::Circle(r.read_u32()?)),
                2 => Ok(Shape::Square(r.read_u32()?, r.read_u32()?)),
                tag => Err(CodecError::UnknownTag {
                    family: Self::FAMILY,
                    tag,
                }),
            }
        }
    }

    #[test]
    fn vec_roundtrip_preserves_order() {
        let v = vec![3i32, -1, 7];
        let bytes = to_bytes(&v);
        assert_eq!(&bytes[..4], &[3, 0, 0, 0]);
        let back: Vec<i32> = from_bytes(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn option_hash_distinguishes_absent_from_zero() {
        assert_ne!(calculate_hash(&None::<u32>), calculate_hash(&Some(0u32)));
    }

    #[test]
    fn string_hash_depends_on_content() {
        assert_ne!(
            calculate_hash(&"ab".to_owned()),
            calculate_hash(&"ba".to_owned())
        );
    }

    #[test]
    fn vec_compare_reports_length_and_elements() {
        let mut cx = CompareCx::new("v");
        vec![1u32, 2, 3].compare(&vec![1u32, 5], &mut cx);
        let found = cx.finish();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].path, "v");
        assert_eq!(found[1].path, "v[1]");
    }

    #[test]
    fn polymorphic_dispatches_on_tag() {
        let mut w = Writer::new();
        write_polymorphic(&mut w, Some(&Shape::Square(2, 3)));
        write_polymorphic::<Shape>(&mut w, None);
        write_polymorphic(&mut w, Some(&Shape::Circle(9)));
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(
            read_polymorphic::<Shape>(&mut r).unwrap(),
            Some(Shape::Square(2, 3))
        );
        assert_eq!(read_polymorphic::<Shape>(&mut r).unwrap(), None);
        assert_eq!(
            read_polymorphic::<Shape>(&mut r).unwrap(),
            Some(Shape::Circle(9))
        );
        r.finish().unwrap();
    }

    #[test]
    fn polymorphic_unknown_tag_is_rejected() {
        let bytes = [7u8, 0];
        let mut r = Reader::new(&bytes);
        assert!(matches!(
            read_polymorphic::<Shape>(&mut r),
            Err(CodecError::UnknownTag {
                family: "shape",
                tag: 7
            })
        ));
    }

    #[test]
    fn nan_compares_equal_to_itself_bitwise() {
        let mut cx = CompareCx::new("f");
        f32::NAN.compare(&f32::NAN, &mut cx);
        assert_eq!(cx.mismatch_count(), 0);
    }
}
