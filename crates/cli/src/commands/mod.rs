pub mod bench;
pub mod runs;
pub mod scan;
pub mod score;
pub mod stats;

pub use bench::*;
pub use runs::*;
pub use scan::*;
pub use score::*;
pub use stats::*;
