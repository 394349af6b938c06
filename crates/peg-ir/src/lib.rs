//! peg-ir - program expression graph construction
//!
//! Converts reducible control-flow graphs into program expression graphs,
//! the value-oriented representation used by equality-saturation style
//! optimizers.
//!
//! Pipeline: source CFG -> loop forest -> augmented PEG -> PEG values

mod domtree;

pub mod cfg;
pub mod peg;

pub use cfg::{Block, BlockId, Function, Loop, LoopId, LoopInfo, Terminator};
pub use peg::{
    build, render_block_graph, render_value_graph, validate, write_dot_files, BuildError,
    DotConfig, PegBlock, PegCondition, PegDomTree, PegFunction, PegNode, PegNodeId, PegPhi,
    PegTheta, PegValidationError,
};
