//! Converts DMX scene documents into compact chunked binary model and animation streams.

mod attribute;

pub use attribute::Angle;
pub use attribute::Attribute;
pub use attribute::AttributeError;
pub use attribute::BinaryBlock;
pub use attribute::Color;
pub use attribute::Matrix;
pub use attribute::Quaternion;
pub use attribute::Vector2;
pub use attribute::Vector3;
pub use attribute::Vector4;

mod element;

pub use element::Element;

pub mod keyvalues2;

pub use keyvalues2::Keyvalues2DecodeError;
pub use keyvalues2::decode;

pub mod skeleton;

pub mod export;

pub use export::ExportError;
pub use export::ExportOutput;
pub use export::Exporter;
pub use export::export;
