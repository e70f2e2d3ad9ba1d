pub mod config;
pub mod depth;
pub mod error;
pub mod frontmatter;
pub mod gate;
pub mod io;
pub mod paths;
pub mod phase;
pub mod plan;
pub mod roadmap;
pub mod skill;
pub mod state;
pub mod table;

pub use error::{PlanningError, Result};
