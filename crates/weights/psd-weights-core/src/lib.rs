//! psd-weights-core: joint sampling and the pose-space weight policies.
//!
//! Typical flow for one owner:
//! 1) Sample each filtered joint with [`JointSampler`].
//! 2) Evaluate each [`SavedPoseEntry`] bound to a sampled joint with
//!    [`evaluate_entry`], collecting writes into a [`psd_api_core::WriteBatch`].
//! 3) Evaluate [`TriggerEntry`] proximity weights from world-space heads.

pub mod algorithms;
pub mod config_file;
pub mod entry;
pub mod library;
pub mod math;
pub mod rig;
pub mod sampler;

pub use algorithms::{
    axis_falloff, cone_falloff, direct_channel, evaluate_entry, linear_projection,
    swing_twist_axis_weight, triangular_envelope, trigger_weight, Tolerance, ROTATION_TOLERANCE,
    VECTOR_TOLERANCE,
};
pub use config_file::{
    export_document, merge_document, ConfigDocument, ConfigError, EntryRecord, MergeReport,
    TwistMode,
};
pub use entry::{
    Axis, DirectChannel, Falloff, LocationChannel, RestPose, RotationChannel, SavedPoseEntry,
    ScaleChannel, SwingComponent, TriggerEntry,
};
pub use library::{BoneFilter, LibraryError, PoseLibrary};
pub use math::Vec3;
pub use rig::{Rig, SimpleRig};
pub use sampler::{JointSample, JointSampler, SamplingError};
