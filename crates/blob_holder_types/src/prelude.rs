//! Common types, for convenience.

pub use crate::action::*;
pub use crate::error::*;
pub use crate::ops::*;
pub use crate::record::*;
pub use crate::status::*;
pub use crate::store::*;
pub use crate::token::*;
