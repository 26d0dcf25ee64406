pub mod errors;
pub mod ids;
pub mod session;
pub mod space;

pub use errors::*;
pub use ids::*;
pub use session::*;
pub use space::*;
