//! Simulation component identifiers.

/// Identifier of a simulation component.
///
/// Identifiers are assigned sequentially upon the component registration
/// via [`Simulation::create_context`](crate::Simulation::create_context)
/// or [`Simulation::add_handler`](crate::Simulation::add_handler).
pub type Id = u32;
