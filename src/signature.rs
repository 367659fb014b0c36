//! Call-site argument classification.
//!
//! [`SignatureBuilder`] walks a call's arguments in declaration order. Each
//! argument either lands in the [`ParameterBuffer`] with a type tag in the
//! signature, or is folded into the signature text as a literal. The joined
//! signature is both the compiler input and the variant cache key.
//!
//! Precedence per argument:
//!
//! | argument              | declared kind  | signature tag        | buffer  |
//! |-----------------------|----------------|----------------------|---------|
//! | absent optional       | any            | `nullopt`            | -       |
//! | array                 | NonConstexpr   | `*fp32`              | address |
//! | array                 | Specialized    | `*fp32` + hint       | address |
//! | array                 | Constexpr      | error                | -       |
//! | value                 | Constexpr      | literal              | -       |
//! | integral value        | Specialized    | `i64` + hint         | unless `:1` |
//! | other value           | Specialized    | `fp32`               | value   |
//! | value                 | NonConstexpr   | `i64`                | value   |
//!
//! Dynamic scalars resolve to a concrete value first, present optionals are
//! unwrapped.

use serde::{Deserialize, Serialize};

use crate::error::{JitError, JitResult};
use crate::param_buffer::ParameterBuffer;
use crate::types::{ArgKind, ArrayRef, KernelArg, ScalarValue, StaticSignature};

/// Tag for an absent optional argument.
pub const NULLOPT: &str = "nullopt";

/// Trailing null pointers required by the compiled artifact ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScratchSlots {
    None,
    /// Global scratch pointer.
    Global,
    /// Global scratch and profile scratch pointers.
    GlobalAndProfile,
}

impl ScratchSlots {
    #[cfg(feature = "profile-scratch")]
    pub const DEFAULT: ScratchSlots = ScratchSlots::GlobalAndProfile;
    #[cfg(not(feature = "profile-scratch"))]
    pub const DEFAULT: ScratchSlots = ScratchSlots::Global;

    pub const fn count(self) -> usize {
        match self {
            Self::None => 0,
            Self::Global => 1,
            Self::GlobalAndProfile => 2,
        }
    }

    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            0 => Some(Self::None),
            1 => Some(Self::Global),
            2 => Some(Self::GlobalAndProfile),
            _ => None,
        }
    }
}

impl Default for ScratchSlots {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `:16` if divisible by 16, `:1` if equal to one, otherwise nothing.
pub fn specialization_hint(value: i128) -> &'static str {
    if value % 16 == 0 {
        ":16"
    } else if value == 1 {
        ":1"
    } else {
        ""
    }
}

/// Comma-join per-argument tags.
pub fn join_signature<S: AsRef<str>>(tags: &[S]) -> String {
    let mut out = String::new();
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(tag.as_ref());
    }
    out
}

pub struct SignatureBuilder<'a> {
    ssig: &'a StaticSignature,
    buffer: ParameterBuffer,
    tags: Vec<String>,
    cursor: usize,
}

impl<'a> SignatureBuilder<'a> {
    pub fn new(ssig: &'a StaticSignature) -> Self {
        Self {
            ssig,
            buffer: ParameterBuffer::with_capacity(ssig.num_args()),
            tags: Vec::with_capacity(ssig.num_args()),
            cursor: 0,
        }
    }

    /// Classify and pack a whole argument list.
    pub fn handle_args<'b, I>(&mut self, args: I) -> JitResult<()>
    where
        I: IntoIterator<Item = &'b KernelArg>,
    {
        for arg in args {
            self.handle_arg(arg)?;
        }
        Ok(())
    }

    /// Classify and pack the argument for the next declared parameter.
    pub fn handle_arg(&mut self, arg: &KernelArg) -> JitResult<()> {
        match arg {
            KernelArg::Optional(Some(inner)) => self.handle_arg(inner),
            KernelArg::Optional(None) => {
                self.declared_kind()?;
                self.tags.push(NULLOPT.to_string());
                self.cursor += 1;
                Ok(())
            }
            KernelArg::Scalar(scalar) => {
                let value = scalar.resolve()?;
                self.handle_value(value)
            }
            KernelArg::Array(array) => self.handle_array(array),
            KernelArg::Value(value) => self.handle_value(*value),
        }
    }

    fn declared_kind(&self) -> JitResult<ArgKind> {
        self.ssig
            .at(self.cursor)
            .ok_or_else(|| JitError::InvalidClassification {
                index: self.cursor,
                reason: format!(
                    "kernel declares {} parameters, got more arguments",
                    self.ssig.num_args()
                ),
            })
    }

    fn handle_array(&mut self, array: &ArrayRef) -> JitResult<()> {
        let kind = self.declared_kind()?;
        if kind == ArgKind::Constexpr {
            return Err(JitError::InvalidClassification {
                index: self.cursor,
                reason: "array arguments cannot be constexpr".to_string(),
            });
        }
        let dtype = array.dtype().tag()?;
        let hint = match kind {
            ArgKind::Specialized => specialization_hint(array.data_ptr() as i128),
            _ => "",
        };

        self.buffer.push(array.data_ptr());
        self.tags.push(format!("*{dtype}{hint}"));
        self.cursor += 1;
        Ok(())
    }

    fn handle_value(&mut self, value: ScalarValue) -> JitResult<()> {
        match self.declared_kind()? {
            ArgKind::Constexpr => {
                self.tags.push(value.to_string());
            }
            ArgKind::Specialized => match value.integral() {
                Some(v) => {
                    let hint = specialization_hint(v);
                    if hint != ":1" {
                        push_value(&mut self.buffer, value);
                    }
                    self.tags.push(format!("{}{hint}", value.type_tag()));
                }
                None => {
                    push_value(&mut self.buffer, value);
                    self.tags.push(value.type_tag().to_string());
                }
            },
            ArgKind::NonConstexpr => {
                push_value(&mut self.buffer, value);
                self.tags.push(value.type_tag().to_string());
            }
        }
        self.cursor += 1;
        Ok(())
    }

    /// Append the ABI scratch pointers. They never appear in the signature.
    pub fn append_scratch(&mut self, slots: ScratchSlots) {
        log::debug!("appending {} scratch slot(s)", slots.count());
        for _ in 0..slots.count() {
            self.buffer.push_null();
        }
    }

    /// Number of declared parameters consumed so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn signature(&self) -> String {
        join_signature(&self.tags)
    }

    pub fn buffer(&self) -> &ParameterBuffer {
        &self.buffer
    }

    /// Check arity and hand back the packed buffer and the signature.
    pub fn finish(self) -> JitResult<(ParameterBuffer, String)> {
        if self.cursor != self.ssig.num_args() {
            return Err(JitError::InvalidClassification {
                index: self.cursor,
                reason: format!(
                    "kernel declares {} parameters, got {} arguments",
                    self.ssig.num_args(),
                    self.cursor
                ),
            });
        }
        let signature = join_signature(&self.tags);
        Ok((self.buffer, signature))
    }
}

fn push_value(buffer: &mut ParameterBuffer, value: ScalarValue) {
    match value {
        // Kernels take i1 as a 32-bit integer.
        ScalarValue::Bool(v) => buffer.push(v as i32),
        ScalarValue::I32(v) => buffer.push(v),
        ScalarValue::U32(v) => buffer.push(v),
        ScalarValue::I64(v) => buffer.push(v),
        ScalarValue::U64(v) => buffer.push(v),
        ScalarValue::F32(v) => buffer.push(v),
        ScalarValue::F64(v) => buffer.push(v),
    }
}
