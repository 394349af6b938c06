//! Program expression graphs.
//!
//! A PEG is a demand-driven, value-oriented view of a function: control flow
//! becomes data dependencies among condition, φ (selection) and θ (loop
//! recurrence) nodes. Once built, the graph is a pure value suitable for
//! algebraic rewriting; nothing in it executes.
//!
//! # Overview
//!
//! Construction goes through an augmented PEG (APEG): every loop header is
//! duplicated by a virtual forward block that absorbs the loop's back edges,
//! which leaves the block graph acyclic. Dominance over that acyclic graph
//! then drives input synthesis: each non-entry block's live-in value is a
//! fold of its incoming edges into φ nodes keyed by nearest common
//! dominators, wrapped in a θ node at loop headers.
//!
//! # Example
//!
//! For `entry -> header; header -> body | exit; body -> header`:
//!
//! ```text
//! header-virtual   <- body           (redirected back edge)
//! header-concrete  <- entry          (loop entry edge)
//! header.child = θ(entry, body)      (iteration 0, then the latch value)
//! exit.child   = header-concrete     (the only predecessor)
//! ```

mod build;
mod decide;
mod domtree;
mod dot;
mod types;
mod validate;

pub use build::{build, BuildError};
pub use domtree::PegDomTree;
pub use dot::{render_block_graph, render_value_graph, write_dot_files, DotConfig};
pub use types::{PegBlock, PegCondition, PegFunction, PegNode, PegNodeId, PegPhi, PegTheta};
pub use validate::{validate, PegValidationError};
