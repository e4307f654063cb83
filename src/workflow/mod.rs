pub mod follow_up_flow;
pub mod solve_flow;

pub use follow_up_flow::FollowUpAnswerer;
pub use solve_flow::{ProblemSolver, ProblemSource};
