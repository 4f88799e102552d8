//! Data preparation stages: vintage alignment, transforms, anomaly
//! correction and indicator standardization.

pub mod correct;
pub mod heatmap;
pub mod transform;
pub mod vintage;

pub use correct::{Correction, DUMMY_GROUP, correct};
pub use heatmap::{Heatmap, standardize};
pub use transform::{apply_transforms, transform_dataset};
pub use vintage::{VintageObservation, VintagePanel, align_vintages, parse_date, parse_vintage_rows, vintage_dates};
