//! Filesystem safety for studiobot.
//!
//! Provides:
//! - **File names**: sanitisation of model-supplied names and validation of
//!   names arriving in URLs or tool arguments
//! - **Project keys**: the identifier grammar used to select project folders
//! - **Containment**: resolving a file name inside an output directory
//!   without escaping it

pub mod filename;
pub mod path;

pub use filename::{
    IMAGE_EXTENSIONS, sanitize_document_filename, sanitize_image_filename,
    validate_input_filename,
};
pub use path::{PathValidationError, resolve_within, validate_project_key};
