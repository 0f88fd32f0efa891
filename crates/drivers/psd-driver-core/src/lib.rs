//! psd-driver-core: expression drivers over pose-space weights.
//!
//! Two driver kinds share one compile/cache/apply pattern:
//! - [`ShapeDriver`] writes clamped values to mesh shape keys, one batch per mesh.
//! - [`PoseDriver`] writes unclamped values to constraint properties.
//!
//! Each keeps its own [`DriverCache`], so identical input tuples in the two kinds
//! never share state.

pub mod compiled;
pub mod expr;
pub mod format;
pub mod pose;
pub mod shape;
pub mod target;

pub use compiled::{CompiledDriver, DriverCache, InputTuple};
pub use expr::{EvalError, Expr, ExprError, Function};
pub use format::{
    parse_data_path, DriverLoadError, PoseDriverDef, PoseTarget, ShapeDriverDef, VariableBinding,
};
pub use pose::{PoseDriver, PoseDriverEntry, PoseReport};
pub use shape::{ShapeDriver, ShapeDriverEntry, ShapeReport};
pub use target::{
    ConstraintHost, ConstraintTable, MeshTable, ShapeKeyHost, ShapeKeySlot, TargetError,
};

/// Outcome of loading one or more driver files.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub files: usize,
    pub loaded: usize,
    pub errors: Vec<DriverLoadError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: LoadReport) {
        self.files += other.files;
        self.loaded += other.loaded;
        self.errors.extend(other.errors);
    }
}
