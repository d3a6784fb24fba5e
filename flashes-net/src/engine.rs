//! Consumed interface of the world-simulation engine.
//!
//! The sync core forwards snapshot and delta payloads to the engine without
//! ever inspecting them; only the engine knows their encoding.

/// A world-simulation engine driven by the sync session.
pub trait SimulationEngine: Send + 'static {
    /// Replace the full world state with a snapshot.
    fn apply_initial_state_vector(&mut self, bytes: &[u8]);

    /// Apply one incremental mutation on top of the current state.
    fn apply_delta(&mut self, bytes: &[u8]);

    /// Advance one simulation/render tick and return the drawable world
    /// state, forwarded verbatim to the presentation layer.
    fn advance_tick(&mut self) -> Vec<u8>;
}
