//! Contains the building blocks of a layout, from primitive matchers up to rules.

pub mod combinators;
pub mod layout;
pub mod matcher;
