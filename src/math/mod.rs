//! Numerical building blocks: descriptive statistics, linear regression,
//! lasso, mutual information and Kalman filtering.

pub mod kalman;
pub mod lasso;
pub mod mutual_info;
pub mod ols;
pub mod stats;

pub use kalman::{StateSpace, filter_smooth};
pub use lasso::{LassoConfig, LassoFit, fit_lasso_cv};
pub use mutual_info::mutual_info_ksg;
pub use ols::*;
pub use stats::*;
