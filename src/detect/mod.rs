mod backend;
mod backends;
pub mod labels;
pub mod nms;
mod result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{LabelMap, COCO_CLASSES};
pub use result::{BoundingBox, ClassDetection, Detection};
