//! Argument model: how a kernel declares its parameters and what a call
//! site passes for them.

use std::fmt;
use std::sync::Arc;

use crate::backend_trait::DeviceIndex;
use crate::error::{JitError, JitResult};
use crate::traits::Element;

/// How the runtime treats one declared kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgKind {
    /// Passed at launch; plain type tag in the signature.
    NonConstexpr = 0,
    /// Passed at launch; the tag gains a divisibility/equal-to-one hint.
    Specialized = 1,
    /// Folded into the signature as a literal; never passed at launch.
    Constexpr = 2,
}

impl TryFrom<i64> for ArgKind {
    type Error = i64;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ArgKind::NonConstexpr),
            1 => Ok(ArgKind::Specialized),
            2 => Ok(ArgKind::Constexpr),
            other => Err(other),
        }
    }
}

/// Per-parameter classification of a kernel, fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSignature {
    kinds: Arc<[ArgKind]>,
}

impl StaticSignature {
    pub fn new(kinds: Vec<ArgKind>) -> Self {
        Self {
            kinds: kinds.into(),
        }
    }

    /// Build from the integer codes reported by the code generator.
    pub fn from_codes(function: &str, codes: &[i64]) -> JitResult<Self> {
        let kinds = codes
            .iter()
            .enumerate()
            .map(|(i, &code)| {
                ArgKind::try_from(code).map_err(|bad| JitError::SignatureExtractionFailed {
                    function: function.to_string(),
                    reason: format!("parameter {i} has unknown classification code {bad}"),
                })
            })
            .collect::<JitResult<Vec<_>>>()?;
        Ok(Self::new(kinds))
    }

    pub fn num_args(&self) -> usize {
        self.kinds.len()
    }

    pub fn at(&self, index: usize) -> Option<ArgKind> {
        self.kinds.get(index).copied()
    }

    pub fn kinds(&self) -> &[ArgKind] {
        &self.kinds
    }
}

/// Element type of an array argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    F8E4M3,
    F8E5M2,
    ComplexF32,
    ComplexF64,
}

impl DType {
    /// Short code used after `*` in a pointer tag.
    pub fn tag(self) -> JitResult<&'static str> {
        Ok(match self {
            Self::F16 => "fp16",
            Self::BF16 => "bf16",
            Self::F32 => "fp32",
            Self::F64 => "fp64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Bool => "i1",
            Self::F8E4M3 | Self::F8E5M2 | Self::ComplexF32 | Self::ComplexF64 => {
                return Err(JitError::UnsupportedElementType(self))
            }
        })
    }

    pub const fn size_bytes(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Bool | Self::F8E4M3 | Self::F8E5M2 => 1,
            Self::F16 | Self::BF16 | Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 | Self::I64 | Self::U64 | Self::ComplexF32 => 8,
            Self::ComplexF64 => 16,
        }
    }
}

/// A device array as seen by the dispatcher: an address, an element type,
/// an element count and the device that owns the memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRef {
    data_ptr: u64,
    dtype: DType,
    numel: usize,
    device: Option<DeviceIndex>,
}

impl ArrayRef {
    /// # Safety
    /// `data_ptr` must address `numel` elements of `dtype` in device memory
    /// that stays alive until every kernel launched with this array has
    /// finished.
    pub unsafe fn from_raw(data_ptr: u64, dtype: DType, numel: usize) -> Self {
        Self {
            data_ptr,
            dtype,
            numel,
            device: None,
        }
    }

    /// # Safety
    /// Same contract as [`ArrayRef::from_raw`].
    pub unsafe fn typed<T: Element>(data_ptr: u64, numel: usize) -> Self {
        Self::from_raw(data_ptr, T::DTYPE, numel)
    }

    pub fn on_device(mut self, device: DeviceIndex) -> Self {
        self.device = Some(device);
        self
    }

    pub fn data_ptr(&self) -> u64 {
        self.data_ptr
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> usize {
        self.numel
    }

    pub fn device(&self) -> Option<DeviceIndex> {
        self.device
    }

    pub fn size_bytes(&self) -> usize {
        self.numel * self.dtype.size_bytes()
    }
}

/// A concrete value passed by value to a kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl ScalarValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Bool(_) => "i1",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "fp32",
            Self::F64(_) => "fp64",
        }
    }

    /// Integer value for divisibility hints. `None` for floats and bools.
    pub fn integral(&self) -> Option<i128> {
        match *self {
            Self::I32(v) => Some(v as i128),
            Self::U32(v) => Some(v as i128),
            Self::I64(v) => Some(v as i128),
            Self::U64(v) => Some(v as i128),
            Self::Bool(_) | Self::F32(_) | Self::F64(_) => None,
        }
    }
}

/// Literal rendering used when the value is folded into a signature.
/// Floats keep a fractional part or exponent so they read back as floats.
impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v:?}"),
            Self::F64(v) => write!(f, "{v:?}"),
        }
    }
}

/// A number whose representation is only known at runtime, as produced by
/// an array library's boxed scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Long(i64),
    UInt64(u64),
    Double(f64),
    ComplexDouble { re: f64, im: f64 },
    /// Not materialized; only an expression name is known.
    Symbolic(String),
}

impl Scalar {
    /// The concrete value a kernel would receive.
    pub fn resolve(&self) -> JitResult<ScalarValue> {
        match self {
            Self::Bool(v) => Ok(ScalarValue::Bool(*v)),
            Self::Long(v) => Ok(ScalarValue::I64(*v)),
            Self::UInt64(v) => Ok(ScalarValue::U64(*v)),
            Self::Double(v) => Ok(ScalarValue::F64(*v)),
            Self::ComplexDouble { .. } => Err(JitError::UnsupportedScalarKind("complex double")),
            Self::Symbolic(expr) => Err(JitError::SymbolicValueUnsupported(expr.clone())),
        }
    }
}

/// One call-site argument.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelArg {
    Array(ArrayRef),
    Scalar(Scalar),
    Value(ScalarValue),
    Optional(Option<Box<KernelArg>>),
}

impl KernelArg {
    pub fn none() -> Self {
        KernelArg::Optional(None)
    }

    /// Device affinity of the argument, looking through optionals.
    pub fn device(&self) -> Option<DeviceIndex> {
        match self {
            KernelArg::Array(array) => array.device(),
            KernelArg::Optional(Some(inner)) => inner.device(),
            _ => None,
        }
    }
}

impl From<ArrayRef> for KernelArg {
    fn from(array: ArrayRef) -> Self {
        KernelArg::Array(array)
    }
}

impl From<Scalar> for KernelArg {
    fn from(scalar: Scalar) -> Self {
        KernelArg::Scalar(scalar)
    }
}

impl From<ScalarValue> for KernelArg {
    fn from(value: ScalarValue) -> Self {
        KernelArg::Value(value)
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ScalarValue {
                fn from(v: $ty) -> Self {
                    ScalarValue::$variant(v)
                }
            }

            impl From<$ty> for KernelArg {
                fn from(v: $ty) -> Self {
                    KernelArg::Value(ScalarValue::$variant(v))
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl<T: Into<KernelArg>> From<Option<T>> for KernelArg {
    fn from(value: Option<T>) -> Self {
        KernelArg::Optional(value.map(|v| Box::new(v.into())))
    }
}

/// Build a `Vec<KernelArg>` from heterogeneous values.
///
/// ```ignore
/// let args = kernel_args![x, y, out, n, 1024i64];
/// ```
#[macro_export]
macro_rules! kernel_args {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::types::KernelArg::from($arg)),*]
    };
}
