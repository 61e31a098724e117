//! The public CSON [`Value`] type: a compact/boxed sum dispatching on
//! the distinction in O(1) (spec.md §3 "operations dispatch on this
//! distinction in O(1) by inspecting the top bit").
//!
//! `Clone`/`Drop` on `Value` *are* `ref`/`unref` (SPEC_FULL.md §3):
//! cloning a compact string duplicates its buffer, cloning a compact
//! scalar is a plain bit copy, and cloning a boxed value bumps the
//! `Rc` strong count. Dropping the last `Rc` reference runs
//! `BoxedValue`'s destructor, which releases an Object's member
//! symbols and recursively drops its children.
//!
//! `Value` wraps a private `Repr` rather than exposing `Compact(u64)`/
//! `Boxed(..)` directly: Design Notes §9 calls for the bit-layout to
//! stay internal ("external callers never see raw pointers"), so the
//! tagged word is reachable only through this crate's own accessors.

use std::cell::RefCell;
use std::rc::Rc;

use crate::array::Array;
use crate::compact::{self, Scalar, ScalarTag};
use crate::compact_string;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::symbol::hash_of;
use crate::{Context, Mode, SymbolsHandle, Type};

/// Per-call override of [`Context`]'s default [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateFlags {
    /// Use the context's default mode.
    #[default]
    Default,
    /// Force the compact tagged-word representation; fails with
    /// [`Error::OutOfRange`] if the payload doesn't fit, or
    /// [`Error::InvalidArg`] for a type with no compact encoding
    /// (Double, Object, Array).
    ForceCompact,
    /// Force the boxed, reference-counted representation.
    ForceBoxed,
}

/// Which representation a value ended up using. Exposed for tests and
/// diagnostics exercising spec.md §8 "Compact/boxed equivalence".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Compact,
    Boxed,
}

/// Input to [`Value::create`]; one arm per spec.md §3's scalar/complex
/// variant list. `Integer` from the spec's sum type is realized as
/// `Int64`, the canonical signed storage used when a caller does not
/// care about width (SPEC_FULL.md §3).
#[derive(Debug, Clone)]
pub enum Payload {
    Null,
    Bool(bool),
    String(String),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Double(f64),
    Object(Object),
    Array(Array),
}

impl Payload {
    fn type_of(&self) -> Type {
        match self {
            Payload::Null => Type::Null,
            Payload::Bool(_) => Type::Bool,
            Payload::String(_) => Type::String,
            Payload::Int8(_) => Type::Int8,
            Payload::Int16(_) => Type::Int16,
            Payload::Int32(_) => Type::Int32,
            Payload::Int64(_) => Type::Int64,
            Payload::UInt8(_) => Type::UInt8,
            Payload::UInt16(_) => Type::UInt16,
            Payload::UInt32(_) => Type::UInt32,
            Payload::UInt64(_) => Type::UInt64,
            Payload::Double(_) => Type::Double,
            Payload::Object(_) => Type::Object,
            Payload::Array(_) => Type::Array,
        }
    }
}

/// The boxed variant's heap-resident payload. Named after each
/// `get_type` arm rather than collapsed, so a boxed value (e.g. one
/// created with `CreateFlags::ForceBoxed`) still reports its exact
/// original width.
#[derive(Debug)]
pub(crate) enum BoxedPayload {
    Null,
    Bool(bool),
    String(String),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Double(f64),
    Object(Object),
    Array(Array),
}

/// Heap storage for a boxed value. `symbols` is a weak back-reference
/// to the owning [`Context`]'s symbol table, resolved only by
/// `Object`'s destructor (spec.md §9: "an object does not own its
/// symbols — it holds weak references that are resolved through the
/// table").
#[derive(Debug)]
pub(crate) struct BoxedValue {
    pub(crate) payload: RefCell<BoxedPayload>,
    pub(crate) symbols: SymbolsHandle,
}

impl Drop for BoxedValue {
    fn drop(&mut self) {
        let BoxedPayload::Object(obj) = &*self.payload.borrow() else {
            return;
        };
        let Some(symbols) = self.symbols.upgrade() else {
            // Context already torn down; nothing to release into.
            return;
        };
        let mut table = symbols.borrow_mut();
        for member in obj.iter() {
            table.release_id(member.symbol_id);
        }
    }
}

/// Internal compact/boxed sum. Never exposed by name outside this
/// crate — see the module doc comment.
#[derive(Debug)]
pub(crate) enum Repr {
    /// A tagged 64-bit word: a scalar packed into its bits, or (low
    /// bit set) a pointer to an individually-owned compact string
    /// buffer.
    Compact(u64),
    Boxed(Rc<BoxedValue>),
}

/// A polymorphic, reference-counted CSON value (spec.md §3).
#[derive(Debug)]
pub struct Value(pub(crate) Repr);

impl Value {
    /// `create`: chooses compact or boxed per spec.md §4.B, combining
    /// the context's default [`Mode`] with a per-call [`CreateFlags`]
    /// override and the payload type's compactability.
    pub fn create(ctx: &Context, payload: Payload, flags: CreateFlags) -> Result<Value> {
        let ty = payload.type_of();
        match payload {
            Payload::Null => Ok(Self::create_atom(ctx, flags, compact::encode_null(), BoxedPayload::Null)),
            Payload::Bool(b) => Ok(Self::create_atom(ctx, flags, compact::encode_bool(b), BoxedPayload::Bool(b))),
            Payload::Int8(v) => Self::create_signed(ctx, flags, ScalarTag::Int8, v as i64, BoxedPayload::Int8(v)),
            Payload::Int16(v) => Self::create_signed(ctx, flags, ScalarTag::Int16, v as i64, BoxedPayload::Int16(v)),
            Payload::Int32(v) => Self::create_signed(ctx, flags, ScalarTag::Int32, v as i64, BoxedPayload::Int32(v)),
            Payload::Int64(v) => Self::create_signed(ctx, flags, ScalarTag::Int64, v, BoxedPayload::Int64(v)),
            Payload::UInt8(v) => Self::create_unsigned(ctx, flags, ScalarTag::UInt8, v as u64, BoxedPayload::UInt8(v)),
            Payload::UInt16(v) => {
                Self::create_unsigned(ctx, flags, ScalarTag::UInt16, v as u64, BoxedPayload::UInt16(v))
            }
            Payload::UInt32(v) => {
                Self::create_unsigned(ctx, flags, ScalarTag::UInt32, v as u64, BoxedPayload::UInt32(v))
            }
            Payload::UInt64(v) => Self::create_unsigned(ctx, flags, ScalarTag::UInt64, v, BoxedPayload::UInt64(v)),
            Payload::Double(v) => {
                if flags == CreateFlags::ForceCompact {
                    return Err(Error::InvalidArg(ty));
                }
                Ok(Self::boxed(ctx, BoxedPayload::Double(v)))
            }
            Payload::String(s) => {
                if Self::wants_compact(ctx, flags) {
                    let ptr = compact_string::alloc(&s)?;
                    Ok(Value(Repr::Compact(compact::encode_string_ptr(ptr))))
                } else {
                    Ok(Self::boxed(ctx, BoxedPayload::String(s)))
                }
            }
            Payload::Object(o) => {
                if flags == CreateFlags::ForceCompact {
                    return Err(Error::InvalidArg(ty));
                }
                Ok(Self::boxed(ctx, BoxedPayload::Object(o)))
            }
            Payload::Array(a) => {
                if flags == CreateFlags::ForceCompact {
                    return Err(Error::InvalidArg(ty));
                }
                Ok(Self::boxed(ctx, BoxedPayload::Array(a)))
            }
        }
    }

    /// Convenience: a compact `Int64`, falling back to boxed if out of
    /// compact range. Used freely by callers (and this crate's own
    /// tests) that don't need a `Context` because no symbol interning
    /// is involved for a bare scalar.
    pub fn create_i64(v: i64) -> Value {
        match compact::encode_signed(ScalarTag::Int64, v) {
            Ok(word) => Value(Repr::Compact(word)),
            Err(_) => Value(Repr::Boxed(Rc::new(BoxedValue {
                payload: RefCell::new(BoxedPayload::Int64(v)),
                symbols: SymbolsHandle::new(),
            }))),
        }
    }

    pub fn null() -> Value {
        Value(Repr::Compact(compact::encode_null()))
    }

    fn wants_compact(ctx: &Context, flags: CreateFlags) -> bool {
        match flags {
            CreateFlags::ForceCompact => true,
            CreateFlags::ForceBoxed => false,
            CreateFlags::Default => ctx.mode == Mode::Compact,
        }
    }

    fn create_atom(ctx: &Context, flags: CreateFlags, word: u64, boxed: BoxedPayload) -> Value {
        if Self::wants_compact(ctx, flags) {
            Value(Repr::Compact(word))
        } else {
            Self::boxed(ctx, boxed)
        }
    }

    /// In `Default` mode under `Mode::Compact`, an out-of-range
    /// integer degrades gracefully to boxed storage rather than
    /// erroring — only an explicit `ForceCompact` treats
    /// out-of-range as a hard failure (open question resolved in
    /// DESIGN.md: spec.md §4.B only documents `RangeError` for
    /// "compact-forced" values).
    fn create_signed(
        ctx: &Context,
        flags: CreateFlags,
        tag: ScalarTag,
        v: i64,
        boxed: BoxedPayload,
    ) -> Result<Value> {
        if Self::wants_compact(ctx, flags) {
            match compact::encode_signed(tag, v) {
                Ok(word) => return Ok(Value(Repr::Compact(word))),
                Err(e) if flags == CreateFlags::ForceCompact => return Err(e),
                Err(_) => {}
            }
        }
        Ok(Self::boxed(ctx, boxed))
    }

    fn create_unsigned(
        ctx: &Context,
        flags: CreateFlags,
        tag: ScalarTag,
        v: u64,
        boxed: BoxedPayload,
    ) -> Result<Value> {
        if Self::wants_compact(ctx, flags) {
            match compact::encode_unsigned(tag, v) {
                Ok(word) => return Ok(Value(Repr::Compact(word))),
                Err(e) if flags == CreateFlags::ForceCompact => return Err(e),
                Err(_) => {}
            }
        }
        Ok(Self::boxed(ctx, boxed))
    }

    fn boxed(ctx: &Context, payload: BoxedPayload) -> Value {
        Value(Repr::Boxed(Rc::new(BoxedValue {
            payload: RefCell::new(payload),
            symbols: ctx.handle(),
        })))
    }

    pub fn representation(&self) -> Representation {
        match &self.0 {
            Repr::Compact(_) => Representation::Compact,
            Repr::Boxed(_) => Representation::Boxed,
        }
    }

    /// `get_type`: branches on the compact/boxed tag in O(1).
    pub fn get_type(&self) -> Type {
        match &self.0 {
            Repr::Compact(word) if compact::is_string(*word) => Type::String,
            Repr::Compact(word) => match compact::decode_scalar(*word) {
                Scalar::Null => Type::Null,
                Scalar::Bool(_) => Type::Bool,
                Scalar::Signed(tag, _) | Scalar::Unsigned(tag, _) => tag.as_type(),
            },
            Repr::Boxed(b) => match &*b.payload.borrow() {
                BoxedPayload::Null => Type::Null,
                BoxedPayload::Bool(_) => Type::Bool,
                BoxedPayload::String(_) => Type::String,
                BoxedPayload::Int8(_) => Type::Int8,
                BoxedPayload::Int16(_) => Type::Int16,
                BoxedPayload::Int32(_) => Type::Int32,
                BoxedPayload::Int64(_) => Type::Int64,
                BoxedPayload::UInt8(_) => Type::UInt8,
                BoxedPayload::UInt16(_) => Type::UInt16,
                BoxedPayload::UInt32(_) => Type::UInt32,
                BoxedPayload::UInt64(_) => Type::UInt64,
                BoxedPayload::Double(_) => Type::Double,
                BoxedPayload::Object(_) => Type::Object,
                BoxedPayload::Array(_) => Type::Array,
            },
        }
    }

    /// Explicit `ref()`, for callers that want the C-derived
    /// vocabulary rather than `Clone::clone` (which has identical
    /// semantics — see the module doc comment).
    pub fn duplicate(&self) -> Result<Value> {
        match &self.0 {
            Repr::Compact(word) if compact::is_string(*word) => {
                let ptr = compact::decode_string_ptr(*word);
                // Safety: `ptr` was produced by `compact_string::alloc`
                // and is live for as long as `self` is.
                let dup = unsafe { compact_string::duplicate(ptr) }?;
                Ok(Value(Repr::Compact(compact::encode_string_ptr(dup))))
            }
            Repr::Compact(word) => Ok(Value(Repr::Compact(*word))),
            Repr::Boxed(rc) => Ok(Value(Repr::Boxed(Rc::clone(rc)))),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self.get_type(), Type::Object)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.get_type(), Type::Array)
    }

    /// `set(object, name, value)`: interns `name`, then replaces or
    /// appends the member. Fails with `InvalidArg` if `self` is not
    /// an Object.
    pub fn object_set(&self, ctx: &Context, name: &str, value: Value) -> Result<()> {
        let Repr::Boxed(rc) = &self.0 else {
            return Err(Error::InvalidArg(self.get_type()));
        };
        let mut payload = rc.payload.borrow_mut();
        let BoxedPayload::Object(obj) = &mut *payload else {
            return Err(Error::InvalidArg(self.get_type()));
        };
        let id = ctx.symbols().intern(name);
        let bits = hash_of(id);
        if obj.set(id, bits, value).is_some() {
            // The replaced member held its own reference to the same
            // symbol_id; release it now that `intern` above accounted
            // for the new member's reference, so occupancy of this
            // name by exactly one member costs exactly one reference.
            ctx.symbols().release_id(id);
        }
        Ok(())
    }

    /// `get(object, name) -> Option<Value>`. A hit is a fresh `ref()`
    /// (via `Clone`) of the stored member, not a borrow.
    pub fn object_get(&self, ctx: &Context, name: &str) -> Option<Value> {
        let Repr::Boxed(rc) = &self.0 else { return None };
        let payload = rc.payload.borrow();
        let BoxedPayload::Object(obj) = &*payload else {
            return None;
        };
        let (id, bits) = ctx.symbols().lookup_by_name(name)?;
        obj.get(id, bits).cloned()
    }

    /// `del(object, name)`. Absent-name and wrong-type are both
    /// "nothing to remove"; only a type mismatch is an error.
    pub fn object_del(&self, ctx: &Context, name: &str) -> Result<Option<Value>> {
        let Repr::Boxed(rc) = &self.0 else {
            return Err(Error::InvalidArg(self.get_type()));
        };
        let mut payload = rc.payload.borrow_mut();
        let BoxedPayload::Object(obj) = &mut *payload else {
            return Err(Error::InvalidArg(self.get_type()));
        };
        let Some((id, bits)) = ctx.symbols().lookup_by_name(name) else {
            return Ok(None);
        };
        let removed = obj.del(id, bits);
        if removed.is_some() {
            ctx.symbols().release_id(id);
        }
        Ok(removed)
    }

    /// Number of members/elements for an Object or Array; `0` for any
    /// other type.
    pub fn len(&self) -> usize {
        let Repr::Boxed(rc) = &self.0 else { return 0 };
        match &*rc.payload.borrow() {
            BoxedPayload::Object(o) => o.len(),
            BoxedPayload::Array(a) => a.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn array_push(&self, value: Value) -> Result<()> {
        let Repr::Boxed(rc) = &self.0 else {
            return Err(Error::InvalidArg(self.get_type()));
        };
        let mut payload = rc.payload.borrow_mut();
        let BoxedPayload::Array(arr) = &mut *payload else {
            return Err(Error::InvalidArg(self.get_type()));
        };
        arr.push(value);
        Ok(())
    }

    pub fn array_get(&self, index: usize) -> Option<Value> {
        let Repr::Boxed(rc) = &self.0 else { return None };
        match &*rc.payload.borrow() {
            BoxedPayload::Array(arr) => arr.get(index).cloned(),
            _ => None,
        }
    }
}

impl Clone for Value {
    /// `Clone::clone` *is* `ref()` (SPEC_FULL.md §3). Compact-string
    /// duplication allocates; like `Vec`/`Rc`'s own `Clone` impls, an
    /// allocator failure here panics rather than threading a
    /// `Result` through `Clone`'s infallible signature. Callers that
    /// must handle `OutOfMemory` explicitly should call
    /// [`Value::duplicate`] instead.
    fn clone(&self) -> Self {
        self.duplicate().expect("compact string duplication failed")
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        if let Repr::Compact(word) = self.0 {
            if compact::is_string(word) {
                // Safety: every compact-string word was produced by
                // `compact_string::alloc`/`duplicate` and is dropped
                // at most once (ownership moves with `Value`).
                unsafe { compact_string::free(compact::decode_string_ptr(word)) };
            }
        }
        // Value(Repr::Boxed(Rc<BoxedValue>)) drops normally;
        // BoxedValue's own Drop impl handles symbol release and
        // recursion.
    }
}
