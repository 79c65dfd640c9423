//! The capability shared by the cover strategies.

use tracing::error;

use crate::error::Result;
use crate::model::{CoverModel, RuleId};

/// A strategy that keeps a cover over the rules registered with it.
///
/// Every engine exclusively owns its [`CoverModel`]. Handing the model to
/// another engine consumes the current one through [`CoverEngine::into_model`].
pub trait CoverEngine {
    fn model(&self) -> &CoverModel;

    fn into_model(self) -> CoverModel
    where
        Self: Sized;

    fn register_rule<I, S>(&mut self, covering_sets: I) -> Result<RuleId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        Self: Sized;

    /// Brings the cover up to date with the rules registered so far.
    fn update_cover(&mut self) -> Result<()>;

    fn cover(&self) -> Vec<String> {
        self.model().cover()
    }

    fn sanity_check(&self) -> bool {
        match self.model().verify() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "sanity check failed");
                false
            }
        }
    }
}
