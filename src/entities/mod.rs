//! Entity module - Contains the SeaORM entity definitions for the agent's state database.

pub mod unit_state;

pub use unit_state::{Column as UnitStateColumn, Entity as UnitState, Model as UnitStateModel};
