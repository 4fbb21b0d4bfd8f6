//! Typed, named uniform cells.
//!
//! A parameter is written by its owner (`set`) and uploaded by the backend
//! (`apply`) right before the draw that uses it, so one program can serve many
//! draws per frame with different values.
//!
//! # Invariants
//! - The uniform location is resolved once, when the parameter is created.
//! - `apply` uploads exactly the `amount * components` values last passed to `set`.
//! - A parameter is only applied while its owning shader is bound.

use crate::handles::{ShaderId, UniformLocation};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Element type of a shader parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
}

impl ParamType {
    pub const ALL: [ParamType; 8] = [
        Self::Float,
        Self::Float2,
        Self::Float3,
        Self::Float4,
        Self::Int,
        Self::Int2,
        Self::Int3,
        Self::Int4,
    ];

    /// Scalars per element.
    pub fn components(self) -> usize {
        match self {
            Self::Float | Self::Int => 1,
            Self::Float2 | Self::Int2 => 2,
            Self::Float3 | Self::Int3 => 3,
            Self::Float4 | Self::Int4 => 4,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Self::Int | Self::Int2 | Self::Int3 | Self::Int4)
    }
}

/// Errors from writing a parameter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("parameter `{name}` is {expected:?}, cannot store {got} data")]
    TypeMismatch {
        name: String,
        expected: ParamType,
        got: &'static str,
    },
    #[error("parameter `{name}` needs {needed} values, got {got}")]
    NotEnoughData {
        name: String,
        needed: usize,
        got: usize,
    },
}

/// Receiver of uniform uploads. Implemented by backend contexts.
pub trait UniformSink {
    fn upload_f32(&mut self, location: UniformLocation, ty: ParamType, data: &[f32]);
    fn upload_i32(&mut self, location: UniformLocation, ty: ParamType, data: &[i32]);
}

#[derive(Debug, Default)]
struct ParamCell {
    amount: usize,
    floats: Vec<f32>,
    ints: Vec<i32>,
}

/// Scalar types a parameter can hold.
pub trait ParamScalar: Copy + sealed::Sealed {
    const KIND: &'static str;
    const IS_INT: bool;
    #[doc(hidden)]
    fn store(cell: &mut Vec<f32>, ints: &mut Vec<i32>, data: &[Self]);
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for i32 {}
}

impl ParamScalar for f32 {
    const KIND: &'static str = "float";
    const IS_INT: bool = false;

    fn store(floats: &mut Vec<f32>, _ints: &mut Vec<i32>, data: &[Self]) {
        floats.clear();
        floats.extend_from_slice(data);
    }
}

impl ParamScalar for i32 {
    const KIND: &'static str = "int";
    const IS_INT: bool = true;

    fn store(_floats: &mut Vec<f32>, ints: &mut Vec<i32>, data: &[Self]) {
        ints.clear();
        ints.extend_from_slice(data);
    }
}

/// One named uniform bound to one location of one shader.
pub struct ShaderParameter {
    name: String,
    ty: ParamType,
    shader: ShaderId,
    location: Option<UniformLocation>,
    cell: Mutex<ParamCell>,
}

impl fmt::Debug for ShaderParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderParameter")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("location", &self.location)
            .finish()
    }
}

impl ShaderParameter {
    /// Created by a backend after resolving `location` for `name` in `shader`.
    /// A `None` location means the uniform is absent or optimized out; applying
    /// such a parameter is a no-op.
    pub fn new(
        name: impl Into<String>,
        ty: ParamType,
        shader: ShaderId,
        location: Option<UniformLocation>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            shader,
            location,
            cell: Mutex::new(ParamCell::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ParamType {
        self.ty
    }

    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn location(&self) -> Option<UniformLocation> {
        self.location
    }

    /// Store `amount` elements taken from the front of `data`.
    pub fn set<T: ParamScalar>(&self, amount: usize, data: &[T]) -> Result<(), ParamError> {
        if T::IS_INT != self.ty.is_int() {
            return Err(ParamError::TypeMismatch {
                name: self.name.clone(),
                expected: self.ty,
                got: T::KIND,
            });
        }
        let needed = amount * self.ty.components();
        if data.len() < needed {
            return Err(ParamError::NotEnoughData {
                name: self.name.clone(),
                needed,
                got: data.len(),
            });
        }
        let mut cell = self.cell.lock();
        let ParamCell {
            amount: stored,
            floats,
            ints,
        } = &mut *cell;
        T::store(floats, ints, &data[..needed]);
        *stored = amount;
        Ok(())
    }

    /// Number of elements written by the last `set`.
    pub fn amount(&self) -> usize {
        self.cell.lock().amount
    }

    /// Snapshot of the stored float data.
    pub fn floats(&self) -> Vec<f32> {
        self.cell.lock().floats.clone()
    }

    /// Snapshot of the stored int data.
    pub fn ints(&self) -> Vec<i32> {
        self.cell.lock().ints.clone()
    }

    /// Upload the stored value to the currently bound program.
    pub fn apply(&self, sink: &mut dyn UniformSink) {
        let Some(location) = self.location else {
            tracing::trace!(name = %self.name, "parameter has no uniform location");
            return;
        };
        let cell = self.cell.lock();
        if cell.amount == 0 {
            return;
        }
        if self.ty.is_int() {
            sink.upload_i32(location, self.ty, &cell.ints);
        } else {
            sink.upload_f32(location, self.ty, &cell.floats);
        }
    }
}

/// The parameters a component owns for one draw.
///
/// Cloning is cheap; queued elements share the same cells as the owning
/// component. Dropping the last clone releases the parameters.
#[derive(Debug, Clone)]
pub struct ParameterBlock(Arc<[Arc<ShaderParameter>]>);

impl Default for ParameterBlock {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl FromIterator<Arc<ShaderParameter>> for ParameterBlock {
    fn from_iter<I: IntoIterator<Item = Arc<ShaderParameter>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ParameterBlock {
    pub fn new(params: Vec<Arc<ShaderParameter>>) -> Self {
        Self(Arc::from(params))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShaderParameter>> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ShaderParameter>> {
        self.0.iter().find(|p| p.name() == name)
    }

    /// Apply every parameter owned by `shader`. Returns how many were skipped
    /// because they belong to another shader.
    pub fn apply_for(&self, shader: ShaderId, sink: &mut dyn UniformSink) -> usize {
        let mut skipped = 0;
        for param in self.0.iter() {
            if param.shader() == shader {
                param.apply(sink);
            } else {
                tracing::warn!(name = %param.name(), "parameter belongs to a different shader");
                skipped += 1;
            }
        }
        skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[derive(Default)]
    struct Recorder {
        floats: Vec<(UniformLocation, ParamType, Vec<f32>)>,
        ints: Vec<(UniformLocation, ParamType, Vec<i32>)>,
    }

    impl UniformSink for Recorder {
        fn upload_f32(&mut self, location: UniformLocation, ty: ParamType, data: &[f32]) {
            self.floats.push((location, ty, data.to_vec()));
        }

        fn upload_i32(&mut self, location: UniformLocation, ty: ParamType, data: &[i32]) {
            self.ints.push((location, ty, data.to_vec()));
        }
    }

    fn shader_ids() -> (ShaderId, ShaderId) {
        let mut map: SlotMap<ShaderId, ()> = SlotMap::with_key();
        (map.insert(()), map.insert(()))
    }

    #[test]
    fn set_then_apply_uploads_data() {
        let (shader, _) = shader_ids();
        let p = ShaderParameter::new("uTint", ParamType::Float3, shader, Some(UniformLocation(4)));
        p.set(1, &[0.25f32, 0.5, 1.0]).unwrap();

        let mut rec = Recorder::default();
        p.apply(&mut rec);
        assert_eq!(
            rec.floats,
            vec![(UniformLocation(4), ParamType::Float3, vec![0.25, 0.5, 1.0])]
        );
    }

    #[test]
    fn set_truncates_to_amount() {
        let (shader, _) = shader_ids();
        let p = ShaderParameter::new("uFrames", ParamType::Int2, shader, Some(UniformLocation(0)));
        p.set(1, &[3, 4, 5, 6]).unwrap();
        assert_eq!(p.ints(), vec![3, 4]);
        assert_eq!(p.amount(), 1);
    }

    #[test]
    fn wrong_scalar_kind_is_rejected() {
        let (shader, _) = shader_ids();
        let p = ShaderParameter::new("uCount", ParamType::Int, shader, None);
        let err = p.set(1, &[1.0f32]).unwrap_err();
        assert!(matches!(err, ParamError::TypeMismatch { .. }));
    }

    #[test]
    fn short_data_is_rejected() {
        let (shader, _) = shader_ids();
        let p = ShaderParameter::new("uColor", ParamType::Float4, shader, None);
        let err = p.set(2, &[1.0f32; 7]).unwrap_err();
        assert_eq!(
            err,
            ParamError::NotEnoughData {
                name: "uColor".into(),
                needed: 8,
                got: 7
            }
        );
    }

    #[test]
    fn unset_or_unlocated_parameters_upload_nothing() {
        let (shader, _) = shader_ids();
        let unset = ShaderParameter::new("a", ParamType::Float, shader, Some(UniformLocation(1)));
        let missing = ShaderParameter::new("b", ParamType::Float, shader, None);
        missing.set(1, &[1.0f32]).unwrap();

        let mut rec = Recorder::default();
        unset.apply(&mut rec);
        missing.apply(&mut rec);
        assert!(rec.floats.is_empty());
    }

    #[test]
    fn block_skips_foreign_parameters() {
        let (mine, other) = shader_ids();
        let location = |i| Some(UniformLocation(i));
        let a = Arc::new(ShaderParameter::new("a", ParamType::Int, mine, location(0)));
        let b = Arc::new(ShaderParameter::new("b", ParamType::Int, other, location(1)));
        a.set(1, &[7]).unwrap();
        b.set(1, &[9]).unwrap();
        let block = ParameterBlock::new(vec![a, b]);

        let mut rec = Recorder::default();
        assert_eq!(block.apply_for(mine, &mut rec), 1);
        assert_eq!(rec.ints.len(), 1);
        assert_eq!(rec.ints[0].2, vec![7]);
        assert!(block.get("b").is_some());
    }
}
