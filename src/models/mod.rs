//! Nowcasting estimators behind one interface.
//!
//! Every estimator implements [`NowcastModel`]; [`build_model`] maps the
//! closed [`ModelKind`] enum onto a boxed implementation so the pipeline can
//! fit any mix of models generically (and in parallel).

pub mod bridge;
pub mod factor;
pub mod var;

pub use bridge::{BridgeConfig, BridgeModel, RegressionMethod};
pub use factor::{FactorConfig, FactorModel};
pub use var::{VarConfig, VarModel};

use crate::domain::{ModelKind, Panel};
use crate::error::{NowcastError, Result};

/// Fit/forecast/summarize contract shared by the estimators.
///
/// `nowcast` and `summarize` return [`NowcastError::Unfitted`] until `fit`
/// has succeeded; that check precedes any validation of their arguments.
pub trait NowcastModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn is_fitted(&self) -> bool;

    /// Estimate parameters on `panel`, replacing any previous fit.
    fn fit(&mut self, panel: &Panel) -> Result<()>;

    /// In-sample values and/or `horizon` out-of-sample steps; the exact
    /// layout depends on the estimator.
    fn nowcast(&self, horizon: usize) -> Result<Panel>;

    /// Human-readable report of the fitted parameters.
    fn summarize(&self) -> Result<String>;
}

/// Settings for every estimator; [`build_model`] picks the relevant one.
#[derive(Debug, Clone)]
pub struct ModelConfigs {
    pub factor: FactorConfig,
    pub bridge: BridgeConfig,
    pub var: VarConfig,
}

pub fn build_model(kind: ModelKind, configs: &ModelConfigs) -> Box<dyn NowcastModel> {
    match kind {
        ModelKind::Factor => Box::new(FactorModel::new(configs.factor.clone())),
        ModelKind::Bridge => Box::new(BridgeModel::new(configs.bridge.clone())),
        ModelKind::Var => Box::new(VarModel::new(configs.var.clone())),
    }
}

pub(crate) fn unfitted(kind: ModelKind) -> NowcastError {
    NowcastError::Unfitted { model: kind.label() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> ModelConfigs {
        ModelConfigs {
            factor: FactorConfig::default(),
            bridge: BridgeConfig::new("gdp"),
            var: VarConfig::default(),
        }
    }

    #[test]
    fn every_model_reports_unfitted_the_same_way() {
        for kind in [ModelKind::Factor, ModelKind::Bridge, ModelKind::Var] {
            let model = build_model(kind, &configs());
            assert_eq!(model.kind(), kind);
            assert!(!model.is_fitted());

            // Horizon 0 is invalid for VAR and 1 for bridge; unfitted wins.
            for h in [0, 1] {
                let err = model.nowcast(h).unwrap_err();
                assert_eq!(err, NowcastError::Unfitted { model: kind.label() });
            }
            let err = model.summarize().unwrap_err();
            assert_eq!(err, NowcastError::Unfitted { model: kind.label() });
        }
    }
}
