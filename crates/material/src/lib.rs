//! Shader materials.
//!
//! - [`reflection`] loads the shader reflection document into a [`Layout`]
//! - [`builder`] derives descriptor set layouts, the pipeline layout and the
//!   graphics pipeline from it
//! - [`Material`] owns the result

pub mod builder;
mod error;
pub mod material;
pub mod reflection;

pub use builder::{BindingKind, BindingSlot, BuildStage};
pub use error::{MaterialError, MaterialResult};
pub use material::Material;
pub use reflection::{Layout, PropertyKind, PropertyLayout, SetLayout};
