//! Protocol parameters.
//!
//! Everything consensus touches is collected in [`Params`] and threaded
//! explicitly through component constructors. Nodes on the same network
//! must agree on all of these values.

mod params;

pub use params::{Params, ParamsError, ScoreWeights, PPM_SCALE};
