pub mod mcp;
pub mod turn;

pub use turn::{ RawTurn, RawValue, Role, Timestamp, Turn };
